//! 图片抓取服务 - 业务能力层
//!
//! 只负责"从一篇论文页面中提取图片"这一能力：
//! 按顺序尝试几种页面结构，第一种命中的结构胜出；都不命中时返回空列表。

use std::collections::HashSet;

use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::infrastructure::RateLimitedClient;
use crate::models::{FigureRecord, PaperMetadata};
use crate::utils::normalize_whitespace;
use crate::utils::text::is_cdn_image_url;

const LABEL_SELECTORS: [&str; 7] = [
    ".fig-label",
    ".figure-title",
    ".fig-title",
    "strong",
    ".caption-title",
    "h3",
    "h4",
];

const CAPTION_SELECTORS: [&str; 5] = [
    ".fig-caption",
    "figcaption",
    ".caption",
    ".figure-caption",
    ".caption-text",
];

/// 标签超过该长度时视为误选了正文
const MAX_LABEL_CHARS: usize = 200;
/// 图注短于该长度时继续尝试下一个选择器
const MIN_CAPTION_CHARS: usize = 10;

/// 图片块的页面结构
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FigurePattern {
    /// 带 `figcaption` 的 `figure` 元素（新版 PMC 页面）
    FigureWithCaption,
    /// `div.fig`（旧版 PMC 页面）
    ClassicFigDiv,
    /// `id` 形如 `F1` / `fig1` 且包含图片的元素
    FigureIdWithImage,
}

impl FigurePattern {
    /// 按优先级排列
    pub const ORDERED: [FigurePattern; 3] = [
        FigurePattern::FigureWithCaption,
        FigurePattern::ClassicFigDiv,
        FigurePattern::FigureIdWithImage,
    ];

    fn selector(self) -> &'static str {
        match self {
            FigurePattern::FigureWithCaption => "figure",
            FigurePattern::ClassicFigDiv => "div.fig",
            FigurePattern::FigureIdWithImage => r#"[id^="F"], [id^="fig"]"#,
        }
    }

    fn accepts(self, element: &ElementRef) -> bool {
        match self {
            FigurePattern::FigureWithCaption => has_descendant(element, "figcaption"),
            FigurePattern::ClassicFigDiv => true,
            FigurePattern::FigureIdWithImage => {
                element.value().id().is_some_and(is_figure_id) && has_descendant(element, "img")
            }
        }
    }
}

/// 从页面中解析出的图片块（尚未确定最终链接）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FigureBlock {
    pub element_id: Option<String>,
    /// 图片页路径中的编号：元素 id，没有 id 时为 `figure_<n>`
    pub figure_id: String,
    pub label: String,
    pub caption: String,
    /// 块内直接出现的 CDN 原图
    pub inline_cdn_url: Option<String>,
    /// 块内第一张图片（绝对地址）
    pub inline_image_url: Option<String>,
}

impl FigureBlock {
    fn has_image(&self) -> bool {
        self.inline_cdn_url.is_some() || self.inline_image_url.is_some()
    }
}

/// 图片统计
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FigureStats {
    pub total_figures: usize,
    pub with_caption: usize,
    pub cdn_links: usize,
    /// 有图注的图片的平均图注长度（字符）
    pub avg_caption_length: f64,
    #[serde(skip)]
    caption_chars: usize,
}

impl FigureStats {
    pub fn record(&mut self, figures: &[FigureRecord]) {
        for figure in figures {
            self.total_figures += 1;
            if figure.has_caption() {
                self.with_caption += 1;
                self.caption_chars += figure.caption.chars().count();
            }
            if figure.is_cdn_link() {
                self.cdn_links += 1;
            }
        }
        self.avg_caption_length = if self.with_caption == 0 {
            0.0
        } else {
            (self.caption_chars as f64 / self.with_caption as f64 * 10.0).round() / 10.0
        };
    }

    pub fn merge(&mut self, other: &FigureStats) {
        self.total_figures += other.total_figures;
        self.with_caption += other.with_caption;
        self.cdn_links += other.cdn_links;
        self.caption_chars += other.caption_chars;
        self.avg_caption_length = if self.with_caption == 0 {
            0.0
        } else {
            (self.caption_chars as f64 / self.with_caption as f64 * 10.0).round() / 10.0
        };
    }
}

/// 图片抓取器
#[derive(Clone)]
pub struct FigureScraper {
    http: RateLimitedClient,
    resolve_cdn_urls: bool,
}

impl FigureScraper {
    pub fn new(http: RateLimitedClient, config: &Config) -> Self {
        Self {
            http,
            resolve_cdn_urls: config.resolve_cdn_urls,
        }
    }

    /// 抓取一篇论文的所有图片，按页面出现顺序返回
    ///
    /// 页面请求失败或地址无法解析时返回错误（调用方跳过该论文）；
    /// 单个图片页失败只影响该图片能否升级为 CDN 链接。
    pub async fn scrape(&self, paper: &PaperMetadata) -> AppResult<Vec<FigureRecord>> {
        let page_url = Url::parse(&paper.paper_url)
            .map_err(|e| AppError::unexpected_shape("paper_url", format!("{}: {}", paper.paper_url, e)))?;

        let html = self.http.get_text(page_url.as_str()).await?;
        let (pattern, blocks) = extract_figure_blocks(&html, &page_url);

        match pattern {
            Some(pattern) => debug!("{} 使用页面结构 {:?}，找到 {} 个图片块", paper.id, pattern, blocks.len()),
            None => {
                info!("{} 页面中没有找到图片", paper.id);
                return Ok(Vec::new());
            }
        }

        let mut figures = Vec::with_capacity(blocks.len());
        let mut seen_links = HashSet::new();

        for block in blocks {
            let figure_url = self.resolve_link(&block, &page_url).await;
            if !seen_links.insert(figure_url.clone()) {
                debug!("跳过重复图片: {}", figure_url);
                continue;
            }
            figures.push(FigureRecord {
                paper_id: paper.id.clone(),
                label: block.label,
                figure_url,
                caption: block.caption,
            });
        }

        Ok(figures)
    }

    /// 确定图片链接：内联 CDN 原图 > 图片页中的 CDN 原图 > 图片页地址
    async fn resolve_link(&self, block: &FigureBlock, page_url: &Url) -> String {
        if let Some(url) = &block.inline_cdn_url {
            return url.clone();
        }

        let Ok(figure_page) = page_url.join(&format!("figure/{}/", block.figure_id)) else {
            return block
                .inline_image_url
                .clone()
                .unwrap_or_else(|| page_url.to_string());
        };

        if self.resolve_cdn_urls {
            match self.http.get_text(figure_page.as_str()).await {
                Ok(html) => {
                    if let Some(url) = find_cdn_image(&html, &figure_page) {
                        debug!("✓ 在图片页找到 CDN 原图: {}", url);
                        return url;
                    }
                }
                Err(e) => warn!("⚠️ 图片页请求失败，使用图片页地址: {}", e),
            }
        }
        figure_page.to_string()
    }
}

/// 按优先级尝试各页面结构，返回命中的结构与其中的图片块
///
/// 同一元素 id 只保留第一次出现；已选中块内部的元素不再单独成块；
/// 既无图注也无图片的块被丢弃。
pub fn extract_figure_blocks(html: &str, page_url: &Url) -> (Option<FigurePattern>, Vec<FigureBlock>) {
    let document = Html::parse_document(html);

    for pattern in FigurePattern::ORDERED {
        let Ok(selector) = Selector::parse(pattern.selector()) else {
            continue;
        };

        let elements: Vec<ElementRef> = document
            .select(&selector)
            .filter(|el| pattern.accepts(el))
            .collect();
        if elements.is_empty() {
            continue;
        }

        let mut seen_ids = HashSet::new();
        let mut accepted = HashSet::new();
        let mut blocks = Vec::new();
        for element in elements {
            if element.ancestors().any(|node| accepted.contains(&node.id())) {
                continue;
            }
            let element_id = element.value().id().map(str::to_string);
            if let Some(id) = &element_id {
                if !seen_ids.insert(id.clone()) {
                    continue;
                }
            }
            let block = parse_block(&element, element_id, blocks.len() + 1, page_url);
            if block.caption.is_empty() && !block.has_image() {
                continue;
            }
            accepted.insert(element.id());
            blocks.push(block);
        }

        if !blocks.is_empty() {
            return (Some(pattern), blocks);
        }
    }

    (None, Vec::new())
}

fn parse_block(element: &ElementRef, element_id: Option<String>, number: usize, page_url: &Url) -> FigureBlock {
    let label = first_text(element, &LABEL_SELECTORS, |text| text.chars().count() < MAX_LABEL_CHARS)
        .unwrap_or_else(|| format!("Figure {}", number));
    let caption = first_text(element, &CAPTION_SELECTORS, |text| text.chars().count() > MIN_CAPTION_CHARS)
        .unwrap_or_default();

    let image_urls: Vec<String> = image_sources(element)
        .filter_map(|src| page_url.join(src).ok())
        .map(|url| url.to_string())
        .collect();

    FigureBlock {
        figure_id: element_id.clone().unwrap_or_else(|| format!("figure_{}", number)),
        element_id,
        label,
        caption,
        inline_cdn_url: image_urls.iter().find(|url| is_cdn_image_url(url)).cloned(),
        inline_image_url: image_urls.into_iter().next(),
    }
}

/// 依次尝试选择器，返回第一个满足条件的文本（已合并空白）
fn first_text(element: &ElementRef, selectors: &[&str], accept: impl Fn(&str) -> bool) -> Option<String> {
    selectors.iter().find_map(|raw| {
        let selector = Selector::parse(raw).ok()?;
        let found = element.select(&selector).next()?;
        let text = normalize_whitespace(&found.text().collect::<Vec<_>>().join(" "));
        (!text.is_empty() && accept(&text)).then_some(text)
    })
}

/// 元素内所有 `img` 的 `src` / `data-src`
fn image_sources<'a>(element: &ElementRef<'a>) -> impl Iterator<Item = &'a str> {
    let selector = Selector::parse("img").ok();
    let images: Vec<ElementRef<'a>> = match &selector {
        Some(selector) => element.select(selector).collect(),
        None => Vec::new(),
    };
    images.into_iter().flat_map(|img| {
        let value = img.value();
        [value.attr("src"), value.attr("data-src")]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|src| !src.is_empty())
    })
}

/// `F1`、`fig2`、`Fig3` 这类图片 id
fn is_figure_id(id: &str) -> bool {
    ["fig", "Fig", "F"].iter().any(|prefix| {
        id.strip_prefix(prefix)
            .and_then(|rest| rest.chars().next())
            .is_some_and(|c| c.is_ascii_digit())
    })
}

fn has_descendant(element: &ElementRef, tag: &str) -> bool {
    Selector::parse(tag)
        .map(|selector| element.select(&selector).next().is_some())
        .unwrap_or(false)
}

/// 在图片详情页中查找 CDN 原图
pub fn find_cdn_image(html: &str, page_url: &Url) -> Option<String> {
    let document = Html::parse_document(html);
    let found = image_sources(&document.root_element())
        .filter_map(|src| page_url.join(src).ok())
        .map(|url| url.to_string())
        .find(|url| is_cdn_image_url(url));
    found
}
