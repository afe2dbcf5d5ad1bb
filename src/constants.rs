/// MediaPipe face mesh 输出的关键点数量（不含 refine 后的虹膜点）
pub const FACE_MESH_LANDMARKS: usize = 468;

/// 上唇中央
pub const UPPER_LIP_CENTER: usize = 13;

/// 上唇内缘下方（内唇线）
pub const INNER_LOWER_LIP: usize = 14;

/// 下唇中央
pub const LOWER_LIP_CENTER: usize = 17;

/// 左口角
pub const MOUTH_CORNER_LEFT: usize = 61;

/// 右口角
pub const MOUTH_CORNER_RIGHT: usize = 291;

/// 额头顶部
pub const FACE_TOP: usize = 10;

/// 下巴底部
pub const FACE_BOTTOM: usize = 152;

/// 唇部轮廓关键点，用于包围盒张口度
pub const MOUTH_CONTOUR: [usize; 12] = [61, 84, 17, 314, 405, 320, 307, 375, 321, 308, 324, 318];

/// 默认上阈值
pub const DEFAULT_THRESHOLD_HIGH: f64 = 0.002;

/// 默认下阈值
pub const DEFAULT_THRESHOLD_LOW: f64 = 0.001;

/// 判定口呼吸所需的持续张口时间（秒）
pub const DEFAULT_SUSTAINED_OPEN_SECS: f64 = 1.0;

/// 两次通知之间的冷却时间（秒）
pub const DEFAULT_COOLDOWN_SECS: f64 = 300.0;

/// 默认采样频率（次/秒）
pub const DEFAULT_SAMPLE_RATE: u32 = 10;

/// 采样频率上限
pub const MAX_SAMPLE_RATE: u32 = 1000;

/// 内存中保留的历史样本数
pub const DEFAULT_HISTORY_CAPACITY: usize = 300;

/// 状态日志输出间隔（秒）
pub const DEFAULT_STATUS_INTERVAL_SECS: u64 = 10;

/// 滚动日志文件保留个数
pub const DEFAULT_LOG_MAX_FILES: usize = 14;

/// 通知队列容量
pub const DEFAULT_DISPATCH_QUEUE: usize = 8;

/// 单次通知投递超时（秒）
pub const DEFAULT_NOTIFY_TIMEOUT_SECS: u64 = 10;

/// 连续读帧失败时，每隔多少次输出一次警告
pub const SOURCE_FAILURE_LOG_EVERY: u32 = 50;

/// 同时在线的 SSE 连接上限
pub const MAX_SSE_CONNECTIONS: usize = 16;

pub const NOTIFICATION_TITLE: &str = "Mouth breathing detected";

pub const NOTIFICATION_BODY: &str =
    "Mouth breathing has been detected. Try breathing through your nose.";
