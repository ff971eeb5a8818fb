//! NCBI E-utilities 客户端
//!
//! 封装 esearch / esummary / efetch 三个接口的 URL 构造与响应解析，
//! 所有请求都经过 `RateLimitedClient`。

use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::infrastructure::RateLimitedClient;
use crate::utils::normalize_whitespace;

/// 摘要短于该长度时视为无效（通常是 "Abstract" 之类的标题）
const MIN_ABSTRACT_CHARS: usize = 50;

const TOOL_NAME: &str = "case_report_figures";

/// esearch 单页结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPage {
    /// 检索命中总数
    pub total: usize,
    /// 本页的数字编号（不含 PMC 前缀）
    pub ids: Vec<String>,
}

/// esummary 中用到的字段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocSummary {
    pub uid: String,
    pub title: String,
    pub journal: String,
    pub pub_date: String,
    pub pmid: Option<String>,
}

#[derive(Deserialize)]
struct ESearchResponse {
    esearchresult: ESearchResult,
}

#[derive(Deserialize)]
struct ESearchResult {
    #[serde(default)]
    count: Option<String>,
    #[serde(default)]
    idlist: Vec<String>,
    #[serde(default, rename = "ERROR")]
    error: Option<String>,
}

/// E-utilities 客户端
#[derive(Clone)]
pub struct EutilsClient {
    http: RateLimitedClient,
    base_url: String,
    email: String,
    api_key: Option<String>,
}

impl EutilsClient {
    pub fn new(http: RateLimitedClient, config: &Config) -> Self {
        Self {
            http,
            base_url: config.eutils_base_url.trim_end_matches('/').to_string(),
            email: config.ncbi_email.trim().to_string(),
            api_key: config.ncbi_api_key.clone(),
        }
    }

    /// 构造带公共参数（db / tool / email / api_key）的请求地址
    pub fn endpoint_url(&self, endpoint: &str, params: &[(&str, &str)]) -> String {
        let mut url = format!("{}/{}.fcgi?db=pmc", self.base_url, endpoint);
        for (key, value) in params {
            url.push_str(&format!("&{}={}", key, urlencoding::encode(value)));
        }
        url.push_str(&format!("&tool={}", TOOL_NAME));
        url.push_str(&format!("&email={}", urlencoding::encode(&self.email)));
        if let Some(key) = &self.api_key {
            url.push_str(&format!("&api_key={}", urlencoding::encode(key)));
        }
        url
    }

    /// 检索一页编号
    pub async fn esearch(&self, term: &str, retstart: usize, retmax: usize) -> AppResult<SearchPage> {
        let retstart = retstart.to_string();
        let retmax = retmax.to_string();
        let url = self.endpoint_url(
            "esearch",
            &[
                ("term", term),
                ("retstart", &retstart),
                ("retmax", &retmax),
                ("sort", "pub_date"),
                ("retmode", "json"),
            ],
        );
        let body = self.http.get(&url).await?;
        parse_search_page(&body)
    }

    /// 获取单篇论文的概要
    pub async fn esummary(&self, uid: &str) -> AppResult<DocSummary> {
        let url = self.endpoint_url("esummary", &[("id", uid), ("retmode", "json")]);
        let value: JsonValue = self.http.get_json(&url, "esummary").await?;
        parse_summary(&value, uid)
    }

    /// 获取摘要，找不到合适的 `<abstract>` 时返回 `None`
    pub async fn efetch_abstract(&self, uid: &str) -> AppResult<Option<String>> {
        let url = self.endpoint_url("efetch", &[("id", uid), ("retmode", "xml")]);
        let xml = self.http.get_text(&url).await?;
        Ok(extract_abstract(&xml))
    }
}

/// 解析 esearch JSON
pub fn parse_search_page(body: &[u8]) -> AppResult<SearchPage> {
    let response: ESearchResponse =
        serde_json::from_slice(body).map_err(|e| AppError::json("esearch", e))?;
    let result = response.esearchresult;

    if let Some(error) = result.error {
        return Err(AppError::unexpected_shape("esearch", error));
    }

    let total = match result.count.as_deref() {
        Some(count) => count
            .trim()
            .parse()
            .map_err(|_| AppError::unexpected_shape("esearch", format!("count 不是数字: {}", count)))?,
        None => result.idlist.len(),
    };

    debug!("esearch: 总数 {}，本页 {} 条", total, result.idlist.len());
    Ok(SearchPage {
        total,
        ids: result.idlist,
    })
}

/// 从 esummary JSON 中取出指定编号的概要
pub fn parse_summary(value: &JsonValue, uid: &str) -> AppResult<DocSummary> {
    if let Some(error) = value.get("error").and_then(JsonValue::as_str) {
        return Err(AppError::unexpected_shape("esummary", error));
    }

    let doc = value
        .get("result")
        .and_then(|result| result.get(uid))
        .ok_or_else(|| AppError::unexpected_shape("esummary", format!("缺少编号 {} 的结果", uid)))?;

    if let Some(error) = doc.get("error").and_then(JsonValue::as_str) {
        return Err(AppError::unexpected_shape("esummary", error));
    }

    let field = |name: &str| {
        doc.get(name)
            .and_then(JsonValue::as_str)
            .map(normalize_whitespace)
            .unwrap_or_default()
    };

    let title = field("title");
    if title.is_empty() {
        return Err(AppError::unexpected_shape("esummary", format!("编号 {} 缺少标题", uid)));
    }

    let journal = match field("fulljournalname") {
        name if name.is_empty() => field("source"),
        name => name,
    };

    let pmid = doc
        .get("articleids")
        .and_then(JsonValue::as_array)
        .and_then(|ids| {
            ids.iter().find_map(|entry| {
                let is_pmid = entry.get("idtype").and_then(JsonValue::as_str) == Some("pmid");
                entry
                    .get("value")
                    .and_then(JsonValue::as_str)
                    .filter(|v| is_pmid && !v.trim().is_empty() && *v != "0")
                    .map(str::to_string)
            })
        });

    Ok(DocSummary {
        uid: uid.to_string(),
        title,
        journal,
        pub_date: field("pubdate"),
        pmid,
    })
}

/// 从 efetch XML 中取第一个足够长的摘要
pub fn extract_abstract(xml: &str) -> Option<String> {
    let document = Html::parse_document(xml);
    let selector = Selector::parse("abstract").ok()?;
    document
        .select(&selector)
        .map(|el| normalize_whitespace(&el.text().collect::<Vec<_>>().join(" ")))
        .find(|text| text.chars().count() > MIN_ABSTRACT_CHARS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_search_page() {
        let body = br#"{"header":{},"esearchresult":{"count":"245","retmax":"2","retstart":"0","idlist":["11","22"]}}"#;
        let page = parse_search_page(body).unwrap();
        assert_eq!(page.total, 245);
        assert_eq!(page.ids, vec!["11", "22"]);
    }

    #[test]
    fn test_parse_search_page_error() {
        let body = br#"{"esearchresult":{"ERROR":"Invalid query"}}"#;
        assert!(parse_search_page(body).is_err());
        assert!(parse_search_page(b"<html>").is_err());
    }

    #[test]
    fn test_parse_summary() {
        let value = json!({
            "result": {
                "uids": ["123"],
                "123": {
                    "uid": "123",
                    "title": "A rare case of  cardiac myxoma",
                    "fulljournalname": "Journal of Case Reports",
                    "source": "J Case Rep",
                    "pubdate": "2024 Mar",
                    "articleids": [
                        {"idtype": "pmid", "value": "38000001"},
                        {"idtype": "pmcid", "value": "PMC123"}
                    ]
                }
            }
        });
        let summary = parse_summary(&value, "123").unwrap();
        assert_eq!(summary.title, "A rare case of cardiac myxoma");
        assert_eq!(summary.journal, "Journal of Case Reports");
        assert_eq!(summary.pub_date, "2024 Mar");
        assert_eq!(summary.pmid.as_deref(), Some("38000001"));
    }

    #[test]
    fn test_parse_summary_falls_back_to_source() {
        let value = json!({"result": {"9": {"title": "T", "source": "BMJ Case Rep"}}});
        let summary = parse_summary(&value, "9").unwrap();
        assert_eq!(summary.journal, "BMJ Case Rep");
        assert_eq!(summary.pmid, None);
    }

    #[test]
    fn test_parse_summary_error_entry() {
        let value = json!({"result": {"9": {"uid": "9", "error": "cannot get document summary"}}});
        assert!(parse_summary(&value, "9").is_err());
        assert!(parse_summary(&json!({"result": {}}), "9").is_err());
    }

    #[test]
    fn test_extract_abstract_skips_short_blocks() {
        let xml = r#"<article><front><abstract abstract-type="short">Summary</abstract>
            <abstract><p>A 54-year-old man presented with   progressive dyspnea and a
            left atrial mass on echocardiography.</p></abstract></front></article>"#;
        let text = extract_abstract(xml).unwrap();
        assert!(text.starts_with("A 54-year-old man presented with progressive dyspnea"));
        assert_eq!(extract_abstract("<article></article>"), None);
    }

    #[test]
    fn test_endpoint_url_encodes_params() {
        let config = Config {
            ncbi_email: "a+b@example.org".to_string(),
            ncbi_api_key: Some("k1".to_string()),
            ..Config::default()
        };
        let http = RateLimitedClient::new(
            std::sync::Arc::new(crate::infrastructure::ReqwestFetcher::new(config.request_timeout()).unwrap()),
            std::sync::Arc::new(crate::infrastructure::RateLimiter::unlimited()),
            crate::infrastructure::RetryPolicy::default(),
        );
        let client = EutilsClient::new(http, &config);
        let url = client.endpoint_url("esearch", &[("term", "\"case report\"[ti]")]);
        assert!(url.starts_with("https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi?db=pmc"));
        assert!(url.contains("term=%22case%20report%22%5Bti%5D"));
        assert!(url.contains("email=a%2Bb%40example.org"));
        assert!(url.ends_with("&api_key=k1"));
    }
}
