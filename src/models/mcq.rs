use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::subject::UsmleSubject;

/// 选项数量固定为 5（A-E）
pub const OPTION_COUNT: usize = 5;

/// 正确答案字母
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AnswerLetter {
    A,
    B,
    C,
    D,
    E,
}

impl AnswerLetter {
    pub const ALL: [AnswerLetter; OPTION_COUNT] = [
        AnswerLetter::A,
        AnswerLetter::B,
        AnswerLetter::C,
        AnswerLetter::D,
        AnswerLetter::E,
    ];

    /// 0-based 下标
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// 解析模型给出的答案，如 "b"、"B)"、"Option C"
    pub fn parse(raw: &str) -> Option<Self> {
        let cleaned = raw.trim().trim_start_matches("Option").trim_start_matches("option");
        let mut letters = cleaned.chars().filter(|c| c.is_ascii_alphabetic());
        let first = letters.next()?;
        if letters.next().is_some() {
            return None;
        }
        match first.to_ascii_uppercase() {
            'A' => Some(AnswerLetter::A),
            'B' => Some(AnswerLetter::B),
            'C' => Some(AnswerLetter::C),
            'D' => Some(AnswerLetter::D),
            'E' => Some(AnswerLetter::E),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AnswerLetter::A => "A",
            AnswerLetter::B => "B",
            AnswerLetter::C => "C",
            AnswerLetter::D => "D",
            AnswerLetter::E => "E",
        }
    }
}

impl std::fmt::Display for AnswerLetter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 难度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Intermediate,
    Difficult,
}

impl Difficulty {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "easy" => Some(Difficulty::Easy),
            "intermediate" | "medium" => Some(Difficulty::Intermediate),
            "difficult" | "hard" => Some(Difficulty::Difficult),
            _ => None,
        }
    }

    /// 模型给出的难度不合法时，根据图注关键词推断
    pub fn infer_from_caption(caption: &str) -> Self {
        let lower = caption.to_lowercase();
        if ["rare", "unusual", "novel"].iter().any(|w| lower.contains(w)) {
            Difficulty::Difficult
        } else if ["management", "treatment", "intervention"]
            .iter()
            .any(|w| lower.contains(w))
        {
            Difficulty::Intermediate
        } else {
            Difficulty::Easy
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Difficult => "difficult",
        }
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 经过校验的选择题
///
/// 不变量：5 个选项非空且互不相同，`answer` 指向其中之一。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mcq {
    pub question: String,
    pub options: [String; OPTION_COUNT],
    pub answer: AnswerLetter,
    pub commentary: String,
    pub subject: UsmleSubject,
    pub hashtags: BTreeSet<String>,
    pub difficulty: Difficulty,
}

impl Mcq {
    /// 正确选项的文本
    pub fn correct_option(&self) -> &str {
        &self.options[self.answer.index()]
    }

    /// 以逗号拼接的标签（写入 CSV）
    pub fn hashtags_joined(&self) -> String {
        self.hashtags.iter().cloned().collect::<Vec<_>>().join(", ")
    }
}
