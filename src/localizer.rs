//! Native classifier labels and their Russian display names.
//!
//! Each classifier's vocabulary is a closed enum. A label the enum does not
//! know (a retrained model, a `LABEL_n` fallback) is shown as-is.

use crate::types::Mode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentimentLabel {
    Neutral,
    Positive,
    Negative,
}

impl SentimentLabel {
    pub const ALL: [SentimentLabel; 3] = [
        SentimentLabel::Neutral,
        SentimentLabel::Positive,
        SentimentLabel::Negative,
    ];

    pub fn native(&self) -> &'static str {
        match self {
            SentimentLabel::Neutral => "neutral",
            SentimentLabel::Positive => "positive",
            SentimentLabel::Negative => "negative",
        }
    }

    pub fn display(&self) -> &'static str {
        match self {
            SentimentLabel::Neutral => "нейтрально",
            SentimentLabel::Positive => "позитив",
            SentimentLabel::Negative => "негатив",
        }
    }

    pub fn from_native(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.native() == label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmotionLabel {
    Joy,
    Sadness,
    Anger,
    Fear,
    Love,
    Surprise,
}

impl EmotionLabel {
    pub const ALL: [EmotionLabel; 6] = [
        EmotionLabel::Joy,
        EmotionLabel::Sadness,
        EmotionLabel::Anger,
        EmotionLabel::Fear,
        EmotionLabel::Love,
        EmotionLabel::Surprise,
    ];

    pub fn native(&self) -> &'static str {
        match self {
            EmotionLabel::Joy => "joy",
            EmotionLabel::Sadness => "sadness",
            EmotionLabel::Anger => "anger",
            EmotionLabel::Fear => "fear",
            EmotionLabel::Love => "love",
            EmotionLabel::Surprise => "surprise",
        }
    }

    pub fn display(&self) -> &'static str {
        match self {
            EmotionLabel::Joy => "радость",
            EmotionLabel::Sadness => "грусть",
            EmotionLabel::Anger => "злость",
            EmotionLabel::Fear => "страх",
            EmotionLabel::Love => "любовь",
            EmotionLabel::Surprise => "удивление",
        }
    }

    pub fn from_native(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.native() == label)
    }
}

/// Display name for `native` under `mode`, or `native` itself if unmapped.
pub fn localize(mode: Mode, native: &str) -> String {
    let display = match mode {
        Mode::Sentiment => SentimentLabel::from_native(native).map(|l| l.display()),
        Mode::Emotion => EmotionLabel::from_native(native).map(|l| l.display()),
    };
    display.unwrap_or(native).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentiment_table() {
        assert_eq!(localize(Mode::Sentiment, "neutral"), "нейтрально");
        assert_eq!(localize(Mode::Sentiment, "positive"), "позитив");
        assert_eq!(localize(Mode::Sentiment, "negative"), "негатив");
    }

    #[test]
    fn emotion_table() {
        let expected = [
            ("joy", "радость"),
            ("sadness", "грусть"),
            ("anger", "злость"),
            ("fear", "страх"),
            ("love", "любовь"),
            ("surprise", "удивление"),
        ];
        for (native, display) in expected {
            assert_eq!(localize(Mode::Emotion, native), display);
        }
        assert_eq!(EmotionLabel::ALL.len(), expected.len());
    }

    #[test]
    fn unknown_labels_pass_through() {
        assert_eq!(localize(Mode::Sentiment, "LABEL_3"), "LABEL_3");
        assert_eq!(localize(Mode::Emotion, "disgust"), "disgust");
        assert_eq!(localize(Mode::Emotion, ""), "");
        // Case matters: "Joy" is not in the table.
        assert_eq!(localize(Mode::Emotion, "Joy"), "Joy");
    }

    #[test]
    fn tables_are_per_mode() {
        assert_eq!(localize(Mode::Sentiment, "joy"), "joy");
        assert_eq!(localize(Mode::Emotion, "positive"), "positive");
    }
}
