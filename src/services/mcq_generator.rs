//! 选择题生成服务 - 业务能力层
//!
//! 只负责"为一张图片生成一道选择题"：
//! 构造提示词 → 调用模型 → 解析校验 →（必要时）一次修复 → 归一化 → 打乱选项。
//! 任何失败都只会让这张图片没有选择题，不会向上抛出。

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, LazyLock};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::McqError;
use crate::models::{
    AnswerLetter, Difficulty, FigureRecord, Mcq, PaperMetadata, UsmleSubject, OPTION_COUNT,
};
use crate::services::llm_service::ChatModel;
use crate::utils::text::extract_json_object;
use crate::utils::{normalize_whitespace, truncate_text};

pub const SYSTEM_PROMPT: &str =
    "You create high-quality, image-focused MCQs for medical education with USMLE alignment.";

const MAX_HASHTAGS: usize = 10;
const MAX_EXTRACTED_TAGS: usize = 8;

static OPTION_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?i)(option\s*)?[a-e]\s*[\):]\s+").expect("valid regex"));

/// 图注中的医学关键词（影像 / 解剖 / 病理 / 征象 / 操作 / 疾病）
static MEDICAL_TERMS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\b(ct|mri|ultrasound|radiograph|x-ray|mammography|pet|spect|fluoroscopy|angiography)\b",
        r"\b(brain|heart|lung|liver|kidney|breast|spine|abdomen|pelvis|thorax|head|neck)\b",
        r"\b(cancer|tumor|carcinoma|adenoma|metastasis|lesion|mass|nodule|cyst|inflammation)\b",
        r"\b(enhancement|calcification|stenosis|occlusion|hemorrhage|edema|ischemia|infarct)\b",
        r"\b(biopsy|surgery|resection|ablation|stent|catheter|injection|contrast)\b",
        r"\b(diabetes|hypertension|pneumonia|covid|stroke)\b",
        r"\b(myocardial\s+infarction|pulmonary\s+embolism)\b",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("valid regex"))
    .collect()
});

/// 模型输出的解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum McqParse {
    Valid(Mcq),
    Invalid(String),
}

/// 一次生成的结果
#[derive(Debug)]
pub enum McqOutcome {
    Generated { mcq: Mcq, repaired: bool },
    /// 未调用模型（功能关闭或图注不满足条件）
    Skipped(&'static str),
    Failed(McqError),
}

impl McqOutcome {
    pub fn into_mcq(self) -> Option<Mcq> {
        match self {
            McqOutcome::Generated { mcq, .. } => Some(mcq),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct RawMcq {
    #[serde(default)]
    mcq_question: String,
    #[serde(default)]
    option_a: String,
    #[serde(default)]
    option_b: String,
    #[serde(default)]
    option_c: String,
    #[serde(default)]
    option_d: String,
    #[serde(default)]
    option_e: String,
    #[serde(default)]
    answer: String,
    #[serde(default)]
    commentary: String,
    #[serde(default)]
    hashtags: JsonValue,
    #[serde(default)]
    subject: String,
    #[serde(default)]
    difficulty_level: String,
}

/// 选择题统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct McqStats {
    pub generated: usize,
    /// 经过一次修复才合格的数量
    pub repaired: usize,
    pub failed: usize,
    pub skipped: usize,
    pub answer_distribution: BTreeMap<String, usize>,
    pub subject_distribution: BTreeMap<String, usize>,
    pub difficulty_distribution: BTreeMap<String, usize>,
}

impl McqStats {
    pub fn record(&mut self, outcome: &McqOutcome) {
        match outcome {
            McqOutcome::Generated { mcq, repaired } => {
                self.generated += 1;
                if *repaired {
                    self.repaired += 1;
                }
                *self.answer_distribution.entry(mcq.answer.to_string()).or_default() += 1;
                *self.subject_distribution.entry(mcq.subject.to_string()).or_default() += 1;
                *self.difficulty_distribution.entry(mcq.difficulty.to_string()).or_default() += 1;
            }
            McqOutcome::Skipped(_) => self.skipped += 1,
            McqOutcome::Failed(_) => self.failed += 1,
        }
    }

    pub fn merge(&mut self, other: &McqStats) {
        self.generated += other.generated;
        self.repaired += other.repaired;
        self.failed += other.failed;
        self.skipped += other.skipped;
        for (target, source) in [
            (&mut self.answer_distribution, &other.answer_distribution),
            (&mut self.subject_distribution, &other.subject_distribution),
            (&mut self.difficulty_distribution, &other.difficulty_distribution),
        ] {
            for (key, count) in source {
                *target.entry(key.clone()).or_default() += count;
            }
        }
    }
}

/// 选择题生成器
#[derive(Clone)]
pub struct McqGenerator {
    model: Option<Arc<dyn ChatModel>>,
    min_caption_length: usize,
    abstract_prompt_chars: usize,
    shuffle_seed: Option<u64>,
}

impl McqGenerator {
    /// `model` 为 `None` 或配置关闭时，生成器始终返回 `Skipped`
    pub fn new(model: Option<Arc<dyn ChatModel>>, config: &Config) -> Self {
        Self {
            model: model.filter(|_| config.enable_mcq),
            min_caption_length: config.min_caption_length,
            abstract_prompt_chars: config.abstract_prompt_chars,
            shuffle_seed: config.mcq_shuffle_seed,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.model.is_some()
    }

    pub async fn generate(&self, paper: &PaperMetadata, figure: &FigureRecord) -> Option<Mcq> {
        self.generate_with_outcome(paper, figure).await.into_mcq()
    }

    pub async fn generate_with_outcome(&self, paper: &PaperMetadata, figure: &FigureRecord) -> McqOutcome {
        let Some(model) = &self.model else {
            return McqOutcome::Skipped("mcq_disabled");
        };
        let caption = figure.caption.trim();
        if caption.is_empty() {
            return McqOutcome::Skipped("empty_caption");
        }
        if caption.chars().count() < self.min_caption_length {
            return McqOutcome::Skipped("short_caption");
        }

        let prompt = build_prompt(paper, figure, self.abstract_prompt_chars);
        let first = match model.complete(SYSTEM_PROMPT, &prompt).await {
            Ok(text) => text,
            Err(e) => return model_failure(figure, e),
        };

        let (parsed, repaired) = match parse_mcq(&first, caption) {
            McqParse::Valid(mcq) => (mcq, false),
            McqParse::Invalid(reason) => {
                warn!("⚠️ {} 模型输出无效 ({})，尝试修复...", figure.label, reason);
                let repair = build_repair_prompt(&prompt, &first, &reason);
                let second = match model.complete(SYSTEM_PROMPT, &repair).await {
                    Ok(text) => text,
                    Err(e) => return model_failure(figure, e),
                };
                match parse_mcq(&second, caption) {
                    McqParse::Valid(mcq) => (mcq, true),
                    McqParse::Invalid(reason) => {
                        warn!("⚠️ {} 修复后仍然无效，放弃: {}", figure.label, reason);
                        return McqOutcome::Failed(McqError::Invalid { reason });
                    }
                }
            }
        };

        let mcq = self.shuffle(parsed, figure);
        debug!("✓ {} 生成选择题，答案 {}", figure.label, mcq.answer);
        McqOutcome::Generated { mcq, repaired }
    }

    /// 打乱选项并重新映射答案
    ///
    /// 设置了种子时，每张图片的随机序列由种子和图片身份决定，与处理顺序无关。
    fn shuffle(&self, mcq: Mcq, figure: &FigureRecord) -> Mcq {
        match self.shuffle_seed {
            Some(seed) => {
                let mut rng = StdRng::seed_from_u64(figure_seed(seed, figure));
                shuffle_options(mcq, &mut rng)
            }
            None => shuffle_options(mcq, &mut rand::thread_rng()),
        }
    }
}

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

/// 图片级随机种子：对种子和图片身份做 FNV-1a，结果不随编译器版本变化
fn figure_seed(seed: u64, figure: &FigureRecord) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    let mut fold = |bytes: &[u8]| {
        for &byte in bytes {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
    };
    fold(&seed.to_le_bytes());
    for part in [&figure.paper_id, &figure.figure_url, &figure.label] {
        fold(part.as_bytes());
        fold(&[0xff]);
    }
    hash
}

fn model_failure(figure: &FigureRecord, error: anyhow::Error) -> McqOutcome {
    warn!("⚠️ {} 选择题生成失败: {}", figure.label, error);
    McqOutcome::Failed(McqError::Model {
        message: error.to_string(),
    })
}

/// 构造提示词（同样的输入总是得到同样的提示词）
pub fn build_prompt(paper: &PaperMetadata, figure: &FigureRecord, abstract_chars: usize) -> String {
    format!(
        r#"You are a medical education expert creating USMLE-style MCQs. Using the abstract and figure caption below, write ONE imaging-centered MCQ.

**Paper Title:** {title}

**Abstract (context only):** {abstract_text}

**Figure Caption (primary source):** {caption}

**Requirements:**
1. The MCQ must be about what is visible in the image/figure. Begin with brief clinical background, then ask what the image shows.
2. Use details from the caption (modality, key visual features). Do NOT invent unsupported details.
3. Keep it clinically relevant (diagnosis, hallmark sign, staging, complication, next step based on visual finding).
4. Provide exactly 5 distinct options (A-E) with ONE best answer.
5. Add medical hashtags for searchability (max 10, comma-separated, no # symbols).
6. Choose **subject** from USMLE categories:
   - Step 1: Anatomy, Physiology, Biochemistry, Pharmacology, Microbiology & Immunology, Pathology, Behavioral Science & Biostatistics, Genetics
   - Step 2: Internal Medicine, Surgery, Pediatrics, Obstetrics & Gynecology, Psychiatry, Neurology, Emergency Medicine, Family Medicine, Radiology, Oncology
7. Choose **difficulty_level**: easy (basic recognition), intermediate (management/differential), difficult (subspecialty nuances)
8. Provide **commentary** that summarizes the key finding and explains why the answer is correct.

**Return ONLY valid JSON:**
{{
  "mcq_question": "Clinical background + what does the image show?",
  "option_a": "Option A",
  "option_b": "Option B",
  "option_c": "Option C",
  "option_d": "Option D",
  "option_e": "Option E",
  "answer": "A",
  "commentary": "Summary of key finding and explanation of correct answer",
  "hashtags": "imaging modality, anatomy, pathology, findings",
  "subject": "Radiology",
  "difficulty_level": "intermediate"
}}"#,
        title = paper.title,
        abstract_text = truncate_text(&paper.abstract_text, abstract_chars),
        caption = figure.caption.trim(),
    )
}

/// 修复提示词：附带上一次的输出与失败原因
pub fn build_repair_prompt(original_prompt: &str, previous_output: &str, reason: &str) -> String {
    format!(
        "{original_prompt}\n\n\
         Your previous answer could not be used ({reason}):\n\
         ---\n{previous_output}\n---\n\
         Return valid JSON only, with exactly the keys shown above, five distinct non-empty options \
         and an answer letter from A to E. Do not add any text outside the JSON object."
    )
}

/// 解析并校验模型输出
pub fn parse_mcq(text: &str, caption: &str) -> McqParse {
    let Some(json) = extract_json_object(text) else {
        return McqParse::Invalid("not JSON".to_string());
    };
    let raw: RawMcq = match serde_json::from_str(json) {
        Ok(raw) => raw,
        Err(e) => return McqParse::Invalid(format!("not JSON: {}", e)),
    };

    let question = normalize_whitespace(&raw.mcq_question);
    if question.is_empty() {
        return McqParse::Invalid("missing question".to_string());
    }

    let options: [String; OPTION_COUNT] = [
        clean_option(&raw.option_a),
        clean_option(&raw.option_b),
        clean_option(&raw.option_c),
        clean_option(&raw.option_d),
        clean_option(&raw.option_e),
    ];
    if options.iter().any(String::is_empty) {
        return McqParse::Invalid("fewer than 5 non-empty options".to_string());
    }
    let distinct: HashSet<String> = options.iter().map(|o| o.to_lowercase()).collect();
    if distinct.len() != OPTION_COUNT {
        return McqParse::Invalid("duplicate options".to_string());
    }

    let Some(answer) = AnswerLetter::parse(&raw.answer) else {
        return McqParse::Invalid(format!("bad answer letter {:?}", raw.answer));
    };

    let subject = if raw.subject.trim().is_empty() {
        UsmleSubject::infer_from_caption(caption)
    } else {
        UsmleSubject::clamp(&raw.subject)
    };
    let difficulty =
        Difficulty::parse(&raw.difficulty_level).unwrap_or_else(|| Difficulty::infer_from_caption(caption));

    let mut hashtags = normalize_hashtags(&raw.hashtags);
    if hashtags.is_empty() {
        hashtags = extract_medical_tags(caption);
    }

    McqParse::Valid(Mcq {
        question,
        options,
        answer,
        commentary: normalize_whitespace(&raw.commentary),
        subject,
        hashtags,
        difficulty,
    })
}

fn clean_option(raw: &str) -> String {
    let text = normalize_whitespace(raw);
    OPTION_PREFIX.replace(&text, "").trim().to_string()
}

/// 标签归一化：小写、去 `#`、去重，最多 10 个（字符串或数组均可）
pub fn normalize_hashtags(raw: &JsonValue) -> BTreeSet<String> {
    let pieces: Vec<String> = match raw {
        JsonValue::String(text) => vec![text.clone()],
        JsonValue::Array(items) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    };

    let mut tags = BTreeSet::new();
    let tokens = pieces
        .iter()
        .flat_map(|piece| piece.split([',', ';', '\n', '#']))
        .map(|token| {
            token
                .split_whitespace()
                .collect::<Vec<_>>()
                .join("_")
                .to_lowercase()
        })
        .filter(|token| !token.is_empty());

    for token in tokens {
        if tags.len() >= MAX_HASHTAGS {
            break;
        }
        tags.insert(token);
    }
    tags
}

/// 从图注中提取医学关键词作为标签（最多 8 个，按字母序）
pub fn extract_medical_tags(caption: &str) -> BTreeSet<String> {
    let lower = caption.to_lowercase();
    MEDICAL_TERMS
        .iter()
        .flat_map(|pattern| pattern.find_iter(&lower).map(|m| m.as_str().to_string()))
        .map(|term| term.split_whitespace().collect::<Vec<_>>().join("_"))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .take(MAX_EXTRACTED_TAGS)
        .collect()
}

/// 打乱 5 个选项，答案跟随正确选项移动
pub fn shuffle_options<R: rand::Rng + ?Sized>(mcq: Mcq, rng: &mut R) -> Mcq {
    let mut order: Vec<usize> = (0..OPTION_COUNT).collect();
    order.shuffle(rng);

    let correct = mcq.answer.index();
    let answer = order
        .iter()
        .position(|&i| i == correct)
        .and_then(AnswerLetter::from_index)
        .unwrap_or(mcq.answer);
    let options = std::array::from_fn(|slot| mcq.options[order[slot]].clone());

    Mcq {
        options,
        answer,
        ..mcq
    }
}
