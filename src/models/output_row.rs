use serde::Serialize;

use super::mcq::Mcq;
use super::paper::{FigureRecord, PaperMetadata};

/// CSV 列名及顺序，下游按列名读取，不能随意改动
pub const OUTPUT_COLUMNS: [&str; 19] = [
    "pmcid",
    "title",
    "journal",
    "abstract",
    "Figure",
    "link to paper",
    "link to figure",
    "caption",
    "MCQ",
    "optionA",
    "optionB",
    "optionC",
    "optionD",
    "optionE",
    "answer",
    "commentary",
    "subject",
    "hashtags",
    "difficulty_level",
];

/// 输出行：论文元数据 + 图片 + 可选的选择题
///
/// 创建后不再修改。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputRow {
    pub pmcid: String,
    pub title: String,
    pub journal: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub figure_label: String,
    pub paper_link: String,
    pub figure_link: String,
    pub caption: String,
    pub mcq: Option<Mcq>,
}

impl OutputRow {
    pub fn new(paper: &PaperMetadata, figure: FigureRecord, mcq: Option<Mcq>) -> Self {
        Self {
            pmcid: paper.id.clone(),
            title: paper.title.clone(),
            journal: paper.journal.clone(),
            abstract_text: paper.abstract_text.clone(),
            figure_label: figure.label,
            paper_link: paper.paper_url.clone(),
            figure_link: figure.figure_url,
            caption: figure.caption,
            mcq,
        }
    }

    /// 按 `OUTPUT_COLUMNS` 的顺序展开为字段；无选择题时相关列为空
    pub fn to_fields(&self) -> [String; 19] {
        let mcq_fields: [String; 11] = match &self.mcq {
            Some(m) => [
                m.question.clone(),
                m.options[0].clone(),
                m.options[1].clone(),
                m.options[2].clone(),
                m.options[3].clone(),
                m.options[4].clone(),
                m.answer.to_string(),
                m.commentary.clone(),
                m.subject.to_string(),
                m.hashtags_joined(),
                m.difficulty.to_string(),
            ],
            None => Default::default(),
        };
        let [question, a, b, c, d, e, answer, commentary, subject, hashtags, difficulty] =
            mcq_fields;

        [
            self.pmcid.clone(),
            self.title.clone(),
            self.journal.clone(),
            self.abstract_text.clone(),
            self.figure_label.clone(),
            self.paper_link.clone(),
            self.figure_link.clone(),
            self.caption.clone(),
            question,
            a,
            b,
            c,
            d,
            e,
            answer,
            commentary,
            subject,
            hashtags,
            difficulty,
        ]
    }
}
