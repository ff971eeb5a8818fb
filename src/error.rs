use thiserror::Error;

/// 应用程序错误类型
///
/// 只有 `Config` 和 `Sink` 会中止整次运行，其余错误在单篇论文 / 单个图片的粒度上被降级处理。
#[derive(Debug, Error)]
pub enum AppError {
    /// 配置错误（运行前检查）
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 网络请求错误
    #[error("网络错误: {0}")]
    Fetch(#[from] FetchError),
    /// 限流器等待超时
    #[error("限流错误: {0}")]
    RateLimit(#[from] RateLimitError),
    /// 页面或响应结构无法解析
    #[error("解析错误: {0}")]
    Parse(#[from] ParseError),
    /// 输出写入失败
    #[error("输出错误: {0}")]
    Sink(#[from] SinkError),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// NCBI 联系邮箱缺失或格式错误
    #[error("需要有效的 NCBI 联系邮箱 (当前: {value:?})")]
    InvalidEmail { value: String },
    /// 时间窗口参数冲突或缺失
    #[error("时间窗口参数无效: {reason}")]
    InvalidWindow { reason: String },
    /// 日期格式错误
    #[error("日期 {value:?} 不是 YYYY-MM-DD 格式")]
    InvalidDate { value: String },
    /// 数值参数超出范围
    #[error("参数 {name} 的值 {value} 无效: {reason}")]
    InvalidValue {
        name: String,
        value: String,
        reason: String,
    },
    /// 配置文件读取失败
    #[error("读取配置文件 {path} 失败: {source}")]
    FileReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 配置文件 TOML 解析失败
    #[error("解析配置文件 {path} 失败: {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// 网络请求错误
#[derive(Debug, Error)]
pub enum FetchError {
    /// 服务器返回非成功状态码
    #[error("{url} 返回状态码 {status}")]
    Status { url: String, status: u16 },
    /// 请求超时
    #[error("{url} 请求超时")]
    Timeout { url: String },
    /// 连接或传输失败
    #[error("{url} 请求失败: {message}")]
    Transport { url: String, message: String },
}

impl FetchError {
    /// 是否属于可重试的瞬时错误（5xx、429、超时、传输失败）
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Status { status, .. } => *status >= 500 || *status == 429,
            FetchError::Timeout { .. } | FetchError::Transport { .. } => true,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            FetchError::Status { url, .. }
            | FetchError::Timeout { url }
            | FetchError::Transport { url, .. } => url,
        }
    }
}

/// 限流器错误
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// 预计等待时间超过上限
    #[error("限流器等待 {waited_ms}ms 超过上限 {max_wait_ms}ms")]
    Timeout { waited_ms: u128, max_wait_ms: u128 },
}

/// 解析错误
#[derive(Debug, Error)]
pub enum ParseError {
    /// JSON 解析失败
    #[error("JSON 解析失败 ({context}): {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
    /// 响应结构不符合预期
    #[error("响应结构异常 ({context}): {reason}")]
    UnexpectedShape { context: String, reason: String },
}

/// 选择题生成错误
///
/// 只在生成器内部流转，对外表现为"没有选择题"，不会中断论文处理。
#[derive(Debug, Error)]
pub enum McqError {
    /// 模型输出不满足 JSON 约定
    #[error("模型输出无效: {reason}")]
    Invalid { reason: String },
    /// 模型调用失败
    #[error("模型调用失败: {message}")]
    Model { message: String },
}

/// 输出写入错误
#[derive(Debug, Error)]
pub enum SinkError {
    /// 文件写入失败
    #[error("写入 {path} 失败: {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 序列化失败
    #[error("序列化运行摘要失败: {0}")]
    Serialize(#[from] serde_json::Error),
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建响应结构异常错误
    pub fn unexpected_shape(context: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::Parse(ParseError::UnexpectedShape {
            context: context.into(),
            reason: reason.into(),
        })
    }

    /// 创建 JSON 解析错误
    pub fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        AppError::Parse(ParseError::Json {
            context: context.into(),
            source,
        })
    }

    /// 是否为致命错误（需要中止整次运行）
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::Config(_) | AppError::Sink(_))
    }

    /// 用于统计跳过原因的简短分类
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Config(_) => "config",
            AppError::Fetch(e) if e.is_transient() => "network_transient",
            AppError::Fetch(_) => "network_rejected",
            AppError::RateLimit(_) => "rate_limit_timeout",
            AppError::Parse(_) => "parse",
            AppError::Sink(_) => "sink",
        }
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
