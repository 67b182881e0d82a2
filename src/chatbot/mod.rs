//! Question answering over a goniometry recording
//!
//! A question is classified into an [`Intent`] by nearest-neighbour TF-IDF
//! matching, the joint it mentions is extracted separately, and the answer
//! is computed from the dataset's statistics.

pub mod tfidf;
pub mod intents;
pub mod joints;
pub mod sessions;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::analysis::{format_degrees, AngleSeries, AngleStats, Dataset};

pub use intents::{Classification, Intent, IntentClassifier, TRAINING_PHRASES};
pub use joints::{mask_joint_terms, BodyPart, JointQuery, Side};
pub use sessions::ChatSessions;
pub use tfidf::{cosine_similarity, tokenize, TfidfVectorizer};

const HELP_TEXT: &str = "I can answer questions about the loaded recording. Try:\n\
- \"What is the maximum knee angle?\"\n\
- \"Minimum angle of the left hip\"\n\
- \"Average thigh angle\"\n\
- \"Range of motion\"\n\
- \"Which joints are available?\"\n\
- \"How many samples?\" or \"How long is the recording?\"";

/// Answer to one question
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BotReply {
    pub intent: Intent,
    pub confidence: f32,
    /// Joint the question was about, when one was named
    pub joint: Option<String>,
    pub answer: String,
}

pub struct ChatBot {
    classifier: IntentClassifier,
}

impl ChatBot {
    pub fn new(min_confidence: f32) -> Self {
        Self {
            classifier: IntentClassifier::new(min_confidence),
        }
    }

    pub fn classify(&self, question: &str) -> Classification {
        self.classifier.classify(&mask_joint_terms(question))
    }

    pub fn respond(&self, question: &str, dataset: Option<&Dataset>) -> BotReply {
        let query = JointQuery::extract(question);
        let classification = self.classify(question);

        // A bare joint name asks for everything about that joint
        let intent = if classification.intent == Intent::Unknown && query.part.is_some() {
            Intent::Summary
        } else {
            classification.intent
        };

        debug!(
            "Question classified as {} ({:.2}), joint: {}",
            intent, classification.confidence, query
        );

        let answer = match (intent, dataset) {
            (Intent::Greeting, _) => {
                "Hello! Ask me about the joint angles in this recording, or type \"help\".".to_string()
            }
            (Intent::Farewell, _) => "Goodbye!".to_string(),
            (Intent::Thanks, _) => "You're welcome!".to_string(),
            (Intent::Help, _) => HELP_TEXT.to_string(),
            (Intent::Unknown, _) => {
                "Sorry, I did not understand the question. Type \"help\" to see what I can answer.".to_string()
            }
            (_, None) => "No recording is loaded. Upload a CSV or Excel file first.".to_string(),
            (intent, Some(dataset)) => answer_from_data(intent, &query, dataset),
        };

        BotReply {
            intent,
            confidence: classification.confidence,
            joint: (!query.is_empty()).then(|| query.to_string()),
            answer,
        }
    }
}

fn answer_from_data(intent: Intent, query: &JointQuery, dataset: &Dataset) -> String {
    match intent {
        Intent::ListJoints => {
            let columns: Vec<String> = dataset
                .series
                .iter()
                .map(|s| format!("{} ({})", s.label, s.column))
                .collect();
            return format!("Angle columns: {}.", columns.join(", "));
        }
        Intent::Duration if query.is_empty() => {
            return match dataset.duration() {
                Some(d) => format!(
                    "The recording spans {} s over {} samples.",
                    format_number(d, 2),
                    dataset.rows()
                ),
                None => "The recording has no time values.".to_string(),
            };
        }
        Intent::SampleCount if query.is_empty() => {
            return format!("The recording has {} samples with a valid time.", dataset.rows());
        }
        _ => {}
    }

    let selected: Vec<&AngleSeries> = query.select(dataset);
    if selected.is_empty() {
        return format!(
            "No column matches \"{}\". Available: {}.",
            query,
            dataset.labels().join(", ")
        );
    }

    let lines: Vec<String> = selected
        .iter()
        .filter_map(|series| AngleStats::from_series(series, &dataset.time))
        .map(|stats| describe(intent, &stats))
        .collect();

    if lines.is_empty() {
        return format!("\"{}\" has no valid angle values.", query);
    }
    lines.join("\n")
}

fn describe(intent: Intent, stats: &AngleStats) -> String {
    let at = |time: Option<f64>| match time {
        Some(t) => format!(" at t = {}", format_number(t, 2)),
        None => String::new(),
    };

    match intent {
        Intent::MaxAngle => format!(
            "Maximum {} angle: {}{}",
            stats.name,
            format_degrees(Some(stats.max), None),
            at(stats.time_of_max)
        ),
        Intent::MinAngle => format!(
            "Minimum {} angle: {}{}",
            stats.name,
            format_degrees(Some(stats.min), None),
            at(stats.time_of_min)
        ),
        Intent::MeanAngle => format!(
            "Mean {} angle: {}",
            stats.name,
            format_degrees(Some(stats.mean), Some(1))
        ),
        Intent::RangeOfMotion => format!(
            "{} range of motion: {} (from {} to {})",
            stats.name,
            format_degrees(Some(stats.range), Some(1)),
            format_degrees(Some(stats.min), None),
            format_degrees(Some(stats.max), None)
        ),
        Intent::SampleCount => format!("{}: {} valid samples", stats.name, stats.samples),
        _ => {
            let f = stats.formatted();
            format!(
                "{}: min {}, max {}, mean {}, range {}",
                f.name, f.min, f.max, f.mean, f.range
            )
        }
    }
}

/// Fixed decimals with a comma separator
fn format_number(value: f64, decimals: usize) -> String {
    format!("{:.*}", decimals, value).replace('.', ",")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset() -> Dataset {
        Dataset {
            source: "walk.csv".to_string(),
            time_column: "Time".to_string(),
            time: vec![0.0, 0.5, 1.0, 1.5],
            series: vec![
                AngleSeries {
                    column: "Goniometry UpLeg Angle".to_string(),
                    label: "Thigh".to_string(),
                    values: vec![Some(10.0), Some(30.0), Some(20.0), None],
                },
                AngleSeries {
                    column: "knee_angle_left".to_string(),
                    label: "Knee Angle Left".to_string(),
                    values: vec![Some(5.0), Some(-2.5), Some(40.0), Some(12.0)],
                },
            ],
        }
    }

    fn bot() -> ChatBot {
        ChatBot::new(0.2)
    }

    #[test]
    fn test_max_angle_of_named_joint() {
        let data = dataset();
        let reply = bot().respond("What is the maximum angle of the left knee?", Some(&data));
        assert_eq!(reply.intent, Intent::MaxAngle);
        assert_eq!(reply.joint.as_deref(), Some("left knee"));
        assert_eq!(reply.answer, "Maximum Knee Angle Left angle: 40,0° at t = 1,00");
    }

    #[test]
    fn test_min_angle_portuguese() {
        let data = dataset();
        let reply = bot().respond("Qual o ângulo mínimo da coxa?", Some(&data));
        assert_eq!(reply.intent, Intent::MinAngle);
        assert_eq!(reply.answer, "Minimum Thigh angle: 10,0° at t = 0,00");
    }

    #[test]
    fn test_mean_without_joint_covers_all_columns() {
        let data = dataset();
        let reply = bot().respond("average angle", Some(&data));
        assert_eq!(reply.intent, Intent::MeanAngle);
        assert!(reply.joint.is_none());
        let lines: Vec<&str> = reply.answer.lines().collect();
        assert_eq!(lines, vec!["Mean Thigh angle: 20,0°", "Mean Knee Angle Left angle: 13,6°"]);
    }

    #[test]
    fn test_unmatched_joint_lists_columns() {
        let data = dataset();
        let reply = bot().respond("max angle of the wrist", Some(&data));
        assert_eq!(reply.intent, Intent::MaxAngle);
        assert!(reply.answer.contains("No column matches \"wrist\""));
        assert!(reply.answer.contains("Thigh, Knee Angle Left"));
    }

    #[test]
    fn test_data_question_without_recording() {
        let reply = bot().respond("what is the maximum angle", None);
        assert_eq!(reply.intent, Intent::MaxAngle);
        assert!(reply.answer.starts_with("No recording is loaded"));
    }

    #[test]
    fn test_small_talk() {
        let b = bot();
        assert_eq!(b.respond("hello", None).intent, Intent::Greeting);
        assert_eq!(b.respond("obrigado", None).intent, Intent::Thanks);
        assert_eq!(b.respond("help", None).answer, HELP_TEXT);
        assert_eq!(b.respond("qwerty", None).intent, Intent::Unknown);
    }

    #[test]
    fn test_thanks_with_recording_loaded() {
        let data = dataset();
        let b = bot();
        for phrase in ["thank you", "thank you very much", "thanks"] {
            let reply = b.respond(phrase, Some(&data));
            assert_eq!(reply.intent, Intent::Thanks, "{phrase}");
            assert!(reply.joint.is_none(), "{phrase}");
            assert_eq!(reply.answer, "You're welcome!");
        }
    }

    #[test]
    fn test_bare_joint_name_gives_summary() {
        let data = dataset();
        let reply = bot().respond("thigh", Some(&data));
        assert_eq!(reply.intent, Intent::Summary);
        assert_eq!(reply.answer, "Thigh: min 10,0°, max 30,0°, mean 20,0°, range 20,0°");
    }

    #[test]
    fn test_duration_and_samples() {
        let data = dataset();
        let b = bot();
        assert_eq!(
            b.respond("how long is the recording", Some(&data)).answer,
            "The recording spans 1,50 s over 4 samples."
        );
        assert_eq!(
            b.respond("how many samples", Some(&data)).answer,
            "The recording has 4 samples with a valid time."
        );
        assert_eq!(b.respond("how many samples for the thigh", Some(&data)).answer, "Thigh: 3 valid samples");
    }

    #[test]
    fn test_list_joints() {
        let data = dataset();
        let reply = bot().respond("which joints are available", Some(&data));
        assert_eq!(reply.intent, Intent::ListJoints);
        assert_eq!(
            reply.answer,
            "Angle columns: Thigh (Goniometry UpLeg Angle), Knee Angle Left (knee_angle_left)."
        );
    }
}
