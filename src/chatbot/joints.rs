//! Which joint (and side) a question is about

use serde::{Deserialize, Serialize};

use super::tfidf::tokenize;
use crate::analysis::{AngleSeries, Dataset};

/// Words shorter than this must match exactly
const FUZZY_MIN_LEN: usize = 5;

/// One edit away from a joint name but never meant as one (`angle` vs `ankle`)
const NEAR_MISSES: &[&str] = &[
    "angle", "angles", "angulo", "angulos", "eight", "thank", "thanks", "first", "shark",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyPart {
    Knee,
    Hip,
    Ankle,
    Shoulder,
    Elbow,
    Wrist,
    Thigh,
    Shank,
}

impl BodyPart {
    pub const ALL: [BodyPart; 8] = [
        BodyPart::Knee,
        BodyPart::Hip,
        BodyPart::Ankle,
        BodyPart::Shoulder,
        BodyPart::Elbow,
        BodyPart::Wrist,
        BodyPart::Thigh,
        BodyPart::Shank,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BodyPart::Knee => "knee",
            BodyPart::Hip => "hip",
            BodyPart::Ankle => "ankle",
            BodyPart::Shoulder => "shoulder",
            BodyPart::Elbow => "elbow",
            BodyPart::Wrist => "wrist",
            BodyPart::Thigh => "thigh",
            BodyPart::Shank => "shank",
        }
    }

    /// Normalized keywords; multi-word entries are matched as phrases
    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            BodyPart::Knee => &["knee", "knees", "joelho", "joelhos"],
            BodyPart::Hip => &["hip", "hips", "quadril"],
            BodyPart::Ankle => &["ankle", "ankles", "tornozelo"],
            BodyPart::Shoulder => &["shoulder", "ombro"],
            BodyPart::Elbow => &["elbow", "cotovelo"],
            BodyPart::Wrist => &["wrist", "punho", "pulso"],
            BodyPart::Thigh => &["thigh", "upleg", "upper leg", "coxa"],
            BodyPart::Shank => &["shank", "shin", "canela", "leg", "legs", "lower leg"],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }

    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            Side::Left => &["left", "esquerdo", "esquerda", "esq", "l"],
            Side::Right => &["right", "direito", "direita", "dir", "r"],
        }
    }
}

/// Joint mentioned in a question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JointQuery {
    pub part: Option<BodyPart>,
    pub side: Option<Side>,
}

impl JointQuery {
    /// Pull a body part and side out of free text; tolerates one typo in longer words
    pub fn extract(text: &str) -> Self {
        let tokens = tokenize(text);
        let padded = format!(" {} ", tokens.join(" "));

        let phrase_part = BodyPart::ALL.into_iter().find(|part| {
            part.keywords()
                .iter()
                .filter(|k| k.contains(' '))
                .any(|k| padded.contains(&format!(" {k} ")))
        });

        let part = phrase_part.or_else(|| {
            tokens.iter().find_map(|token| {
                BodyPart::ALL.into_iter().find(|part| {
                    part.keywords()
                        .iter()
                        .filter(|k| !k.contains(' '))
                        .any(|k| word_matches(token, k))
                })
            })
        });

        let side = tokens.iter().find_map(|token| {
            [Side::Left, Side::Right]
                .into_iter()
                .find(|side| side.keywords().iter().any(|k| word_matches(token, k)))
        });

        Self { part, side }
    }

    pub fn is_empty(&self) -> bool {
        self.part.is_none() && self.side.is_none()
    }

    /// Angle series this query refers to.
    ///
    /// Without a body part every series qualifies. When a side is asked for but
    /// no column names one, the side-less columns are used.
    pub fn select<'a>(&self, dataset: &'a Dataset) -> Vec<&'a AngleSeries> {
        let by_part: Vec<&AngleSeries> = dataset
            .series
            .iter()
            .filter(|s| match self.part {
                Some(part) => series_mentions(s, part.keywords()),
                None => true,
            })
            .collect();

        let Some(side) = self.side else {
            return by_part;
        };

        let sided: Vec<&AngleSeries> = by_part
            .iter()
            .copied()
            .filter(|s| series_mentions(s, side.keywords()))
            .collect();
        if !sided.is_empty() {
            return sided;
        }

        let unsided: Vec<&AngleSeries> = by_part
            .iter()
            .copied()
            .filter(|s| {
                !series_mentions(s, Side::Left.keywords()) && !series_mentions(s, Side::Right.keywords())
            })
            .collect();
        if unsided.is_empty() && self.part.is_none() {
            by_part
        } else {
            unsided
        }
    }
}

impl std::fmt::Display for JointQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.side, self.part) {
            (Some(side), Some(part)) => write!(f, "{} {}", side.as_str(), part.as_str()),
            (None, Some(part)) => f.write_str(part.as_str()),
            (Some(side), None) => write!(f, "{} side", side.as_str()),
            (None, None) => f.write_str("all joints"),
        }
    }
}

/// Drop joint and side words so they do not sway intent classification
pub fn mask_joint_terms(text: &str) -> String {
    let tokens = tokenize(text);
    let joined = format!(" {} ", tokens.join(" "));

    let mut masked = joined;
    for part in BodyPart::ALL {
        for phrase in part.keywords().iter().filter(|k| k.contains(' ')) {
            masked = masked.replace(&format!(" {phrase} "), " ");
        }
    }

    masked
        .split_whitespace()
        .filter(|token| {
            let is_part = BodyPart::ALL
                .iter()
                .any(|p| p.keywords().iter().any(|k| word_matches(token, k)));
            let is_side = [Side::Left, Side::Right]
                .iter()
                .any(|s| s.keywords().iter().any(|k| word_matches(token, k)));
            !is_part && !is_side
        })
        .collect::<Vec<&str>>()
        .join(" ")
}

fn word_matches(token: &str, keyword: &str) -> bool {
    if token == keyword {
        return true;
    }
    if token.len() < FUZZY_MIN_LEN || keyword.len() < FUZZY_MIN_LEN || NEAR_MISSES.contains(&token) {
        return false;
    }
    // Typos rarely hit the first letter; small talk often differs only there
    if token.chars().next() != keyword.chars().next() {
        return false;
    }
    levenshtein(token, keyword) <= 1
}

fn series_mentions(series: &AngleSeries, keywords: &[&str]) -> bool {
    let tokens: Vec<String> = tokenize(&series.column)
        .into_iter()
        .chain(tokenize(&series.label))
        .collect();
    let padded = format!(" {} ", tokens.join(" "));

    keywords.iter().any(|k| {
        if k.contains(' ') {
            padded.contains(&format!(" {k} "))
        } else {
            tokens.iter().any(|t| t == k)
        }
    })
}

/// Edit distance over characters
fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_chars.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(column: &str, label: &str) -> AngleSeries {
        AngleSeries {
            column: column.to_string(),
            label: label.to_string(),
            values: vec![Some(1.0)],
        }
    }

    fn dataset(series: Vec<AngleSeries>) -> Dataset {
        Dataset {
            source: "t.csv".to_string(),
            time_column: "Time".to_string(),
            time: vec![0.0],
            series,
        }
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("knee", "knee"), 0);
        assert_eq!(levenshtein("shoulder", "shouldr"), 1);
        assert_eq!(levenshtein("ankle", "uncle"), 2);
        assert_eq!(levenshtein("", "hip"), 3);
    }

    #[test]
    fn test_extract_english_and_portuguese() {
        let q = JointQuery::extract("What is the max angle of the left knee?");
        assert_eq!(q.part, Some(BodyPart::Knee));
        assert_eq!(q.side, Some(Side::Left));

        let q = JointQuery::extract("ângulo máximo do joelho direito");
        assert_eq!(q.part, Some(BodyPart::Knee));
        assert_eq!(q.side, Some(Side::Right));

        assert_eq!(JointQuery::extract("how many samples").part, None);
    }

    #[test]
    fn test_extract_tolerates_typos() {
        assert_eq!(JointQuery::extract("max of the shouldr").part, Some(BodyPart::Shoulder));
        assert_eq!(JointQuery::extract("cotovelo esquerdp").side, Some(Side::Left));
        assert_eq!(JointQuery::extract("what about the angles").part, None);
        // Short words must be exact
        assert_eq!(JointQuery::extract("hop angle").part, None);
    }

    #[test]
    fn test_small_talk_is_not_a_joint() {
        assert!(JointQuery::extract("thank you").is_empty());
        assert!(JointQuery::extract("thanks a lot").is_empty());
        assert!(JointQuery::extract("first sample").is_empty());
        assert_eq!(mask_joint_terms("thank you very much"), "thank you very much");
        // A first-letter slip is not treated as a typo
        assert_eq!(JointQuery::extract("max of the whank").part, None);
    }

    #[test]
    fn test_phrase_beats_single_word() {
        assert_eq!(JointQuery::extract("upper leg peak").part, Some(BodyPart::Thigh));
        assert_eq!(JointQuery::extract("leg peak").part, Some(BodyPart::Shank));
    }

    #[test]
    fn test_select_by_part_and_side() {
        let data = dataset(vec![
            series("knee_angle_left", "Knee Angle Left"),
            series("knee_angle_right", "Knee Angle Right"),
            series("hip_angle", "Hip Angle"),
        ]);

        let left_knee = JointQuery::extract("left knee").select(&data);
        assert_eq!(left_knee.len(), 1);
        assert_eq!(left_knee[0].column, "knee_angle_left");

        assert_eq!(JointQuery::extract("knee").select(&data).len(), 2);
        // No sided hip column, so the plain one is used
        assert_eq!(JointQuery::extract("right hip").select(&data)[0].column, "hip_angle");
        assert!(JointQuery::extract("wrist").select(&data).is_empty());
        assert_eq!(JointQuery::default().select(&data).len(), 3);
    }

    #[test]
    fn test_select_thigh_and_shank_columns() {
        let data = dataset(vec![
            series("Goniometry UpLeg Angle", "Thigh"),
            series("Goniometry Leg Angle", "Shank"),
        ]);
        assert_eq!(JointQuery::extract("thigh").select(&data)[0].column, "Goniometry UpLeg Angle");
        let shank = JointQuery::extract("shank").select(&data);
        assert_eq!(shank.len(), 1);
        assert_eq!(shank[0].column, "Goniometry Leg Angle");
    }

    #[test]
    fn test_display() {
        assert_eq!(JointQuery::extract("left knee").to_string(), "left knee");
        assert_eq!(JointQuery::extract("hip").to_string(), "hip");
        assert_eq!(JointQuery::default().to_string(), "all joints");
    }

    #[test]
    fn test_mask_joint_terms() {
        assert_eq!(mask_joint_terms("Max angle of the LEFT knee?"), "max angle of the");
        assert_eq!(mask_joint_terms("upper leg minimum"), "minimum");
    }
}
