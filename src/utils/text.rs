//! 文本处理工具

use std::sync::LazyLock;

use regex::Regex;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

const IMAGE_EXTENSIONS: [&str; 5] = [".jpg", ".jpeg", ".png", ".gif", ".webp"];

/// 合并连续空白并去掉首尾空白
pub fn normalize_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// 截断长文本用于日志显示或提示词
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

/// 是否为 PMC CDN 上的原图链接
pub fn is_cdn_image_url(url: &str) -> bool {
    if url.is_empty() {
        return false;
    }
    let lower = url.to_lowercase();
    lower.contains("/pmc/blobs/") && IMAGE_EXTENSIONS.iter().any(|ext| lower.contains(ext))
}

/// 从模型回复中截取第一个 `{` 到最后一个 `}` 之间的内容
///
/// 兼容 ```json 代码块或前后带说明文字的回复。
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  a\n\t b   c "), "a b c");
        assert_eq!(normalize_whitespace(""), "");
    }

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("abcdef", 3), "abc...");
        assert_eq!(truncate_text("abc", 3), "abc");
    }

    #[test]
    fn test_cdn_detection() {
        assert!(is_cdn_image_url(
            "https://cdn.ncbi.nlm.nih.gov/pmc/blobs/a1b2/123/abc/gr1.jpg"
        ));
        assert!(!is_cdn_image_url(
            "https://pmc.ncbi.nlm.nih.gov/articles/PMC1/figure/F1/"
        ));
        assert!(!is_cdn_image_url("https://cdn.ncbi.nlm.nih.gov/pmc/blobs/a1b2/"));
    }

    #[test]
    fn test_extract_json_object() {
        let reply = "Here you go:\n```json\n{\"a\": {\"b\": 1}}\n```";
        assert_eq!(extract_json_object(reply), Some("{\"a\": {\"b\": 1}}"));
        assert_eq!(extract_json_object("no json"), None);
        assert_eq!(extract_json_object("} {"), None);
    }
}
