//! 集成测试公共设施：固定响应的 HttpFetch、脚本化的 ChatModel 与页面夹具

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use case_report_figures::error::FetchError;
use case_report_figures::infrastructure::{HttpFetch, RateLimiter};
use case_report_figures::services::ChatModel;
use case_report_figures::{CancellationFlag, Config, Pipeline};

pub const EUTILS: &str = "https://eutils.test/entrez/eutils";
pub const PMC: &str = "https://pmc.test";

pub const LONG_CAPTION: &str =
    "Axial contrast-enhanced CT of the abdomen showing a hypodense liver lesion with rim enhancement.";

/// 固定响应
#[derive(Debug, Clone)]
pub enum Frozen {
    Body(String),
    Status(u16),
}

/// 按 URL 返回固定响应的抓取器
///
/// 先查完整 URL，再查片段；同一 URL 匹配多条规则时后加入的生效。未匹配的 URL 返回 404。
#[derive(Default)]
pub struct FrozenFetcher {
    exact: HashMap<String, Frozen>,
    fragments: Vec<(String, Frozen)>,
    calls: Mutex<Vec<String>>,
}

impl FrozenFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exact(mut self, url: impl Into<String>, response: Frozen) -> Self {
        self.exact.insert(url.into(), response);
        self
    }

    pub fn fragment(mut self, fragment: impl Into<String>, response: Frozen) -> Self {
        self.fragments.push((fragment.into(), response));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_containing(&self, fragment: &str) -> usize {
        self.calls().iter().filter(|url| url.contains(fragment)).count()
    }

    fn lookup(&self, url: &str) -> Option<Frozen> {
        if let Some(response) = self.exact.get(url) {
            return Some(response.clone());
        }
        self.fragments
            .iter()
            .rev()
            .find(|(fragment, _)| url.contains(fragment.as_str()))
            .map(|(_, response)| response.clone())
    }
}

#[async_trait]
impl HttpFetch for FrozenFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());
        match self.lookup(url) {
            Some(Frozen::Body(body)) => Ok(body.into_bytes()),
            Some(Frozen::Status(status)) => Err(FetchError::Status {
                url: url.to_string(),
                status,
            }),
            None => Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

/// 请求到指定地址时设置取消标志，其余行为交给内部抓取器
pub struct CancelOnFetch {
    inner: FrozenFetcher,
    trigger: String,
    cancel: CancellationFlag,
}

impl CancelOnFetch {
    pub fn new(inner: FrozenFetcher, trigger: impl Into<String>, cancel: CancellationFlag) -> Self {
        Self {
            inner,
            trigger: trigger.into(),
            cancel,
        }
    }
}

#[async_trait]
impl HttpFetch for CancelOnFetch {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        if url == self.trigger {
            self.cancel.cancel();
        }
        self.inner.fetch(url).await
    }
}

/// 按顺序返回预设回复的模型；用完后重复最后一条
pub struct ScriptedModel {
    replies: Mutex<VecDeque<String>>,
    last: Mutex<Option<String>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            last: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// 每次都返回同一条回复
    pub fn fixed(reply: &str) -> Arc<Self> {
        Self::new(&[reply])
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(&self, _system: &str, user: &str) -> anyhow::Result<String> {
        self.calls.lock().unwrap().push(user.to_string());
        let next = self.replies.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        if let Some(reply) = next {
            *last = Some(reply);
        }
        last.clone().ok_or_else(|| anyhow::anyhow!("no scripted reply"))
    }
}

pub fn test_config() -> Config {
    Config {
        ncbi_email: "curator@example.org".to_string(),
        eutils_base_url: EUTILS.to_string(),
        pmc_base_url: PMC.to_string(),
        llm_api_key: Some("sk-test".to_string()),
        retry_base_delay_ms: 0,
        resolve_cdn_urls: false,
        mcq_shuffle_seed: Some(7),
        ..Config::default()
    }
}

pub fn pipeline(config: &Config, fetcher: Arc<FrozenFetcher>, model: Option<Arc<ScriptedModel>>) -> Pipeline {
    Pipeline::with_limiter(
        config,
        fetcher,
        model.map(|m| m as Arc<dyn ChatModel>),
        Arc::new(RateLimiter::unlimited()),
    )
}

// ========== 夹具 ==========

pub fn esearch_json(count: usize, ids: &[&str]) -> Frozen {
    Frozen::Body(
        serde_json::json!({
            "header": {"type": "esearch", "version": "0.3"},
            "esearchresult": {
                "count": count.to_string(),
                "retmax": ids.len().to_string(),
                "retstart": "0",
                "idlist": ids,
            }
        })
        .to_string(),
    )
}

pub fn esummary_json(uid: &str, title: &str) -> Frozen {
    Frozen::Body(
        serde_json::json!({
            "result": {
                "uids": [uid],
                uid: {
                    "uid": uid,
                    "title": title,
                    "fulljournalname": "Journal of Medical Case Reports",
                    "source": "J Med Case Rep",
                    "pubdate": "2024 Dec 3",
                    "articleids": [{"idtype": "pmid", "value": format!("39{}", uid)}]
                }
            }
        })
        .to_string(),
    )
}

pub fn efetch_xml(text: &str) -> Frozen {
    Frozen::Body(format!(
        "<pmc-articleset><article><front><article-meta><abstract><p>{}</p></abstract></article-meta></front></article></pmc-articleset>",
        text
    ))
}

/// 新版 PMC 页面：`(id, caption, img)`
pub fn article_html(figures: &[(&str, &str, Option<&str>)]) -> Frozen {
    let blocks: String = figures
        .iter()
        .enumerate()
        .map(|(i, (id, caption, img))| {
            let img = img.map(|src| format!(r#"<img src="{}" alt="Figure">"#, src)).unwrap_or_default();
            format!(
                r#"<figure class="fig" id="{id}">{img}<figcaption><h3>Figure {n}</h3><p>{caption}</p></figcaption></figure>"#,
                id = id,
                img = img,
                n = i + 1,
                caption = caption,
            )
        })
        .collect();
    Frozen::Body(format!(
        "<html><head><title>Case</title></head><body><main><article>{}</article></main></body></html>",
        blocks
    ))
}

pub fn paper_url(id: &str) -> String {
    format!("{}/articles/PMC{}/", PMC, id)
}

pub fn cdn_image(id: &str, n: usize) -> String {
    format!("https://cdn.ncbi.nlm.nih.gov/pmc/blobs/ab12/{}/f{}/gr{}.jpg", id, n, n)
}

/// 每篇论文两张图片（一张内联 CDN 原图，一张只有图片页）的完整站点
pub fn standard_site(ids: &[&str]) -> FrozenFetcher {
    let mut fetcher = FrozenFetcher::new().fragment("esearch.fcgi", esearch_json(ids.len(), ids));
    for id in ids {
        fetcher = fetcher
            .fragment(
                format!("esummary.fcgi?db=pmc&id={}&", id),
                esummary_json(id, &format!("An unusual case report number {}", id)),
            )
            .fragment(
                format!("efetch.fcgi?db=pmc&id={}&", id),
                efetch_xml("A 62-year-old woman presented with right upper quadrant pain, fever and an elevated white cell count."),
            )
            .exact(
                paper_url(id),
                article_html(&[
                    ("F1", LONG_CAPTION, Some(&cdn_image(id, 1))),
                    ("F2", "Histopathology of the resected specimen showing granulomas (H&amp;E, x200).", None),
                ]),
            );
    }
    fetcher
}

pub fn valid_mcq_json() -> String {
    serde_json::json!({
        "mcq_question": "A 62-year-old woman presents with fever and RUQ pain. What does the CT show?",
        "option_a": "Pyogenic liver abscess",
        "option_b": "Hepatic hemangioma",
        "option_c": "Focal nodular hyperplasia",
        "option_d": "Simple hepatic cyst",
        "option_e": "Hepatocellular carcinoma",
        "answer": "A",
        "commentary": "A hypodense lesion with rim enhancement in a febrile patient suggests abscess.",
        "hashtags": "ct, liver abscess, rim enhancement",
        "subject": "Radiology",
        "difficulty_level": "intermediate"
    })
    .to_string()
}
