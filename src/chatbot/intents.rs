//! Intent labels, their example phrases and the nearest-neighbour classifier

use serde::{Deserialize, Serialize};

use super::tfidf::{cosine_similarity, TfidfVectorizer};

/// What the user is asking for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Greeting,
    Farewell,
    Thanks,
    Help,
    MaxAngle,
    MinAngle,
    MeanAngle,
    RangeOfMotion,
    Summary,
    ListJoints,
    SampleCount,
    Duration,
    Unknown,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Greeting => "greeting",
            Intent::Farewell => "farewell",
            Intent::Thanks => "thanks",
            Intent::Help => "help",
            Intent::MaxAngle => "max_angle",
            Intent::MinAngle => "min_angle",
            Intent::MeanAngle => "mean_angle",
            Intent::RangeOfMotion => "range_of_motion",
            Intent::Summary => "summary",
            Intent::ListJoints => "list_joints",
            Intent::SampleCount => "sample_count",
            Intent::Duration => "duration",
            Intent::Unknown => "unknown",
        }
    }

    /// Intents answered from the loaded recording
    pub fn needs_data(&self) -> bool {
        matches!(
            self,
            Intent::MaxAngle
                | Intent::MinAngle
                | Intent::MeanAngle
                | Intent::RangeOfMotion
                | Intent::Summary
                | Intent::ListJoints
                | Intent::SampleCount
                | Intent::Duration
        )
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Example phrases, English and Portuguese
pub const TRAINING_PHRASES: &[(Intent, &str)] = &[
    (Intent::Greeting, "hello"),
    (Intent::Greeting, "hi there"),
    (Intent::Greeting, "good morning"),
    (Intent::Greeting, "hey"),
    (Intent::Greeting, "ola"),
    (Intent::Greeting, "oi tudo bem"),
    (Intent::Greeting, "bom dia"),
    (Intent::Farewell, "bye"),
    (Intent::Farewell, "goodbye see you later"),
    (Intent::Farewell, "that is all for today"),
    (Intent::Farewell, "tchau"),
    (Intent::Farewell, "ate logo"),
    (Intent::Thanks, "thanks"),
    (Intent::Thanks, "thank you very much"),
    (Intent::Thanks, "obrigado"),
    (Intent::Thanks, "valeu obrigada"),
    (Intent::Help, "help"),
    (Intent::Help, "what can you do"),
    (Intent::Help, "what questions can i ask"),
    (Intent::Help, "ajuda"),
    (Intent::Help, "o que voce sabe fazer"),
    (Intent::MaxAngle, "what is the maximum angle"),
    (Intent::MaxAngle, "highest angle"),
    (Intent::MaxAngle, "max angle"),
    (Intent::MaxAngle, "peak flexion"),
    (Intent::MaxAngle, "how far did it bend at most"),
    (Intent::MaxAngle, "qual o angulo maximo"),
    (Intent::MaxAngle, "maior angulo"),
    (Intent::MinAngle, "what is the minimum angle"),
    (Intent::MinAngle, "lowest angle"),
    (Intent::MinAngle, "min angle"),
    (Intent::MinAngle, "smallest value"),
    (Intent::MinAngle, "qual o angulo minimo"),
    (Intent::MinAngle, "menor angulo"),
    (Intent::MeanAngle, "what is the average angle"),
    (Intent::MeanAngle, "mean angle"),
    (Intent::MeanAngle, "average value"),
    (Intent::MeanAngle, "qual a media do angulo"),
    (Intent::MeanAngle, "angulo medio"),
    (Intent::RangeOfMotion, "range of motion"),
    (Intent::RangeOfMotion, "what is the rom"),
    (Intent::RangeOfMotion, "difference between max and min"),
    (Intent::RangeOfMotion, "amplitude de movimento"),
    (Intent::RangeOfMotion, "qual a amplitude"),
    (Intent::Summary, "give me a summary"),
    (Intent::Summary, "show all statistics"),
    (Intent::Summary, "overview of the data"),
    (Intent::Summary, "resumo dos dados"),
    (Intent::Summary, "estatisticas"),
    (Intent::ListJoints, "which joints are available"),
    (Intent::ListJoints, "what columns are in the file"),
    (Intent::ListJoints, "list the joints"),
    (Intent::ListJoints, "quais articulacoes"),
    (Intent::ListJoints, "quais colunas tem o arquivo"),
    (Intent::SampleCount, "how many samples"),
    (Intent::SampleCount, "number of rows"),
    (Intent::SampleCount, "how many data points"),
    (Intent::SampleCount, "quantas amostras"),
    (Intent::SampleCount, "quantas linhas"),
    (Intent::Duration, "how long is the recording"),
    (Intent::Duration, "duration"),
    (Intent::Duration, "total time"),
    (Intent::Duration, "quanto tempo durou"),
    (Intent::Duration, "duracao da coleta"),
];

/// Result of classifying one question
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub intent: Intent,
    /// Cosine similarity to the closest example
    pub confidence: f32,
    /// The closest example phrase, if any scored above zero
    pub matched: Option<&'static str>,
}

/// Nearest-neighbour classifier over TF-IDF vectors of `TRAINING_PHRASES`
#[derive(Debug, Clone)]
pub struct IntentClassifier {
    vectorizer: TfidfVectorizer,
    examples: Vec<(Intent, &'static str, Vec<f32>)>,
    min_confidence: f32,
}

impl IntentClassifier {
    pub fn new(min_confidence: f32) -> Self {
        let phrases: Vec<&str> = TRAINING_PHRASES.iter().map(|(_, p)| *p).collect();
        let vectorizer = TfidfVectorizer::fit(&phrases);

        let examples = TRAINING_PHRASES
            .iter()
            .map(|(intent, phrase)| (*intent, *phrase, vectorizer.transform(phrase)))
            .collect();

        Self {
            vectorizer,
            examples,
            min_confidence,
        }
    }

    /// Closest example wins; below `min_confidence` the answer is `Unknown`
    pub fn classify(&self, text: &str) -> Classification {
        let query = self.vectorizer.transform(text);

        let best = self
            .examples
            .iter()
            .map(|(intent, phrase, vector)| (*intent, *phrase, cosine_similarity(&query, vector)))
            .filter(|(_, _, score)| *score > 0.0)
            .max_by(|a, b| a.2.partial_cmp(&b.2).unwrap_or(std::cmp::Ordering::Equal));

        match best {
            Some((intent, phrase, score)) if score >= self.min_confidence => Classification {
                intent,
                confidence: score,
                matched: Some(phrase),
            },
            Some((_, phrase, score)) => Classification {
                intent: Intent::Unknown,
                confidence: score,
                matched: Some(phrase),
            },
            None => Classification {
                intent: Intent::Unknown,
                confidence: 0.0,
                matched: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> IntentClassifier {
        IntentClassifier::new(0.2)
    }

    #[test]
    fn test_every_intent_has_examples() {
        for intent in [
            Intent::Greeting, Intent::Farewell, Intent::Thanks, Intent::Help,
            Intent::MaxAngle, Intent::MinAngle, Intent::MeanAngle, Intent::RangeOfMotion,
            Intent::Summary, Intent::ListJoints, Intent::SampleCount, Intent::Duration,
        ] {
            assert!(TRAINING_PHRASES.iter().any(|(i, _)| *i == intent), "{intent} has no examples");
        }
    }

    #[test]
    fn test_training_phrases_classify_to_themselves() {
        let c = classifier();
        for (intent, phrase) in TRAINING_PHRASES {
            assert_eq!(c.classify(phrase).intent, *intent, "phrase: {phrase}");
        }
    }

    #[test]
    fn test_paraphrases() {
        let c = classifier();
        assert_eq!(c.classify("Hello!").intent, Intent::Greeting);
        assert_eq!(c.classify("what is the maximum angle?").intent, Intent::MaxAngle);
        assert_eq!(c.classify("Qual o ângulo mínimo?").intent, Intent::MinAngle);
        assert_eq!(c.classify("what's the average angle").intent, Intent::MeanAngle);
        assert_eq!(c.classify("how many samples are there").intent, Intent::SampleCount);
        assert_eq!(c.classify("thank you").intent, Intent::Thanks);
    }

    #[test]
    fn test_gibberish_is_unknown() {
        let c = classifier();
        let result = c.classify("zzz qqq");
        assert_eq!(result.intent, Intent::Unknown);
        assert_eq!(result.confidence, 0.0);
        assert!(result.matched.is_none());
    }

    #[test]
    fn test_threshold_applies() {
        let strict = IntentClassifier::new(1.01);
        assert_eq!(strict.classify("hello").intent, Intent::Unknown);
    }
}
