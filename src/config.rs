use anyhow::{anyhow, Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::cooldown::CooldownScope;
use crate::detect::ObjectClass;
use crate::filter::{DetectionPolicy, ZoneMode};
use crate::frame::PixelFormat;

pub const DEFAULT_CONFIG_PATH: &str = "config.env";

const DEFAULT_KEYCHAIN_SERVICE: &str = "aicam";
const DEFAULT_SOCKET_PATH: &str = "/tmp/aicam.sock";
const DEFAULT_FRAME_RATE: u32 = 1;
const DEFAULT_RECONNECT_DELAY_SECS: u64 = 5;
const MAX_RECONNECT_DELAY_SECS: u64 = 300;
const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 10;
const DEFAULT_THRESHOLD: f32 = 0.5;
const DEFAULT_SNAPSHOT_DIR: &str = "snapshots";
const DEFAULT_COOLDOWN_SECS: u64 = 300;
const DEFAULT_ALERT_SCRIPT: &str = "send_alert.sh";
const DEFAULT_MODEL_PATH: &str = "models/yolov8n.onnx";
const DEFAULT_MODEL_INPUT_SIZE: u32 = 640;
const ALERT_RECIPIENT_PREFIX: &str = "ALERT_RECIPIENT_";

/// Keys read from the config file and overridable from the environment.
pub const KNOWN_KEYS: &[&str] = &[
    "RTSP_FEED_URL",
    "CAM_USERNAME",
    "CAM_PASSWORD",
    "KEYCHAIN_SERVICE",
    "OBJECTS_TO_MONITOR",
    "DETECTION_THRESHOLD",
    "SNAPSHOT_ON_DETECTION",
    "SNAPSHOT_DIRECTORY",
    "NOTIFICATION_COOLDOWN",
    "NOTIFICATION_COOLDOWN_SECONDS",
    "COOLDOWN_SCOPE",
    "FRAME_WIDTH",
    "FRAME_HEIGHT",
    "FRAME_RATE",
    "FRAME_PIXEL_FORMAT",
    "FRAME_SOURCE",
    "SOCKET_PATH",
    "RECONNECT_DELAY_SECONDS",
    "PROBE_TIMEOUT_SECONDS",
    "ZONE_CONFIG",
    "ZONE_VIOLATION_MODE",
    "ALERT_SCRIPT",
    "DETECTOR_BACKEND",
    "MODEL_PATH",
    "MODEL_INPUT_SIZE",
    "NOTIFIER",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
    /// Decoder subprocess pulling the RTSP stream.
    Ffmpeg,
    /// Length-prefixed JPEG frames from a local socket.
    Socket,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectorKind {
    Tract,
    Stub,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotifierKind {
    Auto,
    Command,
    Log,
}

#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keychain_service: String,
    pub source: SourceKind,
    pub socket_path: PathBuf,
    pub frame_rate: u32,
    /// Fixed output geometry; `None` means probe the stream.
    pub geometry: Option<(u32, u32)>,
    pub pixel_format: PixelFormat,
    pub reconnect_delay: Duration,
    pub probe_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct DetectionSettings {
    pub backend: DetectorKind,
    pub model_path: PathBuf,
    pub model_input_size: u32,
    pub threshold: f32,
    /// Empty means every class is monitored.
    pub objects: Vec<ObjectClass>,
}

#[derive(Debug, Clone)]
pub struct ActionSettings {
    pub snapshot_on_detection: bool,
    pub snapshot_directory: PathBuf,
    pub cooldown: Duration,
    pub cooldown_scope: CooldownScope,
    pub notifier: NotifierKind,
    pub alert_recipients: Vec<String>,
    pub alert_script: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ZoneSettings {
    pub zone_config: Option<PathBuf>,
    pub mode: ZoneMode,
}

/// Immutable snapshot of operating parameters, loaded once at startup.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub stream: StreamSettings,
    pub detection: DetectionSettings,
    pub actions: ActionSettings,
    pub zone: ZoneSettings,
}

impl MonitorConfig {
    /// Read the config file, let the process environment override it, validate.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
        let mut values = parse_env_file(&raw)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        apply_env(&mut values);
        Self::from_values(&values)
    }

    pub fn from_values(values: &BTreeMap<String, String>) -> Result<Self> {
        let get = |key: &str| values.get(key).map(String::as_str);

        let source = match get("FRAME_SOURCE") {
            None => SourceKind::Ffmpeg,
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "ffmpeg" | "rtsp" => SourceKind::Ffmpeg,
                "socket" => SourceKind::Socket,
                other => {
                    return Err(anyhow!(
                        "FRAME_SOURCE must be 'ffmpeg' or 'socket', got '{}'",
                        other
                    ))
                }
            },
        };

        let url = get("RTSP_FEED_URL").map(str::to_string);
        if source == SourceKind::Ffmpeg && url.is_none() {
            return Err(anyhow!("RTSP_FEED_URL is required"));
        }

        let geometry = match (get("FRAME_WIDTH"), get("FRAME_HEIGHT")) {
            (None, None) => None,
            (Some(w), Some(h)) => Some((
                parse_positive::<u32>("FRAME_WIDTH", w)?,
                parse_positive::<u32>("FRAME_HEIGHT", h)?,
            )),
            _ => return Err(anyhow!("FRAME_WIDTH and FRAME_HEIGHT must be set together")),
        };
        let pixel_format = get("FRAME_PIXEL_FORMAT")
            .map(PixelFormat::from_str)
            .transpose()?
            .unwrap_or(PixelFormat::Rgb24);
        if let (PixelFormat::Nv12, Some((w, h))) = (pixel_format, geometry) {
            if w % 2 != 0 || h % 2 != 0 {
                return Err(anyhow!("nv12 frames need even dimensions, got {}x{}", w, h));
            }
        }

        let reconnect_secs = get("RECONNECT_DELAY_SECONDS")
            .map(|v| parse_positive::<u64>("RECONNECT_DELAY_SECONDS", v))
            .transpose()?
            .unwrap_or(DEFAULT_RECONNECT_DELAY_SECS);
        if reconnect_secs > MAX_RECONNECT_DELAY_SECS {
            return Err(anyhow!(
                "RECONNECT_DELAY_SECONDS must be at most {}",
                MAX_RECONNECT_DELAY_SECS
            ));
        }

        let stream = StreamSettings {
            url,
            username: get("CAM_USERNAME").map(str::to_string),
            password: get("CAM_PASSWORD").map(str::to_string),
            keychain_service: get("KEYCHAIN_SERVICE")
                .unwrap_or(DEFAULT_KEYCHAIN_SERVICE)
                .to_string(),
            source,
            socket_path: PathBuf::from(get("SOCKET_PATH").unwrap_or(DEFAULT_SOCKET_PATH)),
            frame_rate: get("FRAME_RATE")
                .map(|v| parse_positive::<u32>("FRAME_RATE", v))
                .transpose()?
                .unwrap_or(DEFAULT_FRAME_RATE),
            geometry,
            pixel_format,
            reconnect_delay: Duration::from_secs(reconnect_secs),
            probe_timeout: Duration::from_secs(
                get("PROBE_TIMEOUT_SECONDS")
                    .map(|v| parse_positive::<u64>("PROBE_TIMEOUT_SECONDS", v))
                    .transpose()?
                    .unwrap_or(DEFAULT_PROBE_TIMEOUT_SECS),
            ),
        };

        let threshold = match get("DETECTION_THRESHOLD") {
            None => DEFAULT_THRESHOLD,
            Some(value) => value.parse::<f32>().map_err(|_| {
                anyhow!("DETECTION_THRESHOLD must be a number, got '{}'", value)
            })?,
        };
        if !(0.0..=1.0).contains(&threshold) {
            return Err(anyhow!(
                "DETECTION_THRESHOLD must be within [0, 1], got {}",
                threshold
            ));
        }
        let objects = split_csv(get("OBJECTS_TO_MONITOR").unwrap_or(""))
            .iter()
            .map(|name| name.parse::<ObjectClass>())
            .collect::<Result<Vec<_>>>()
            .context("OBJECTS_TO_MONITOR")?;
        let backend = match get("DETECTOR_BACKEND").map(str::to_ascii_lowercase).as_deref() {
            None | Some("tract") => DetectorKind::Tract,
            Some("stub") => DetectorKind::Stub,
            Some(other) => {
                return Err(anyhow!(
                    "DETECTOR_BACKEND must be 'tract' or 'stub', got '{}'",
                    other
                ))
            }
        };
        let detection = DetectionSettings {
            backend,
            model_path: PathBuf::from(get("MODEL_PATH").unwrap_or(DEFAULT_MODEL_PATH)),
            model_input_size: get("MODEL_INPUT_SIZE")
                .map(|v| parse_positive::<u32>("MODEL_INPUT_SIZE", v))
                .transpose()?
                .unwrap_or(DEFAULT_MODEL_INPUT_SIZE),
            threshold,
            objects,
        };

        let cooldown_secs = match (
            get("NOTIFICATION_COOLDOWN_SECONDS"),
            get("NOTIFICATION_COOLDOWN"),
        ) {
            (Some(v), _) => parse_u64("NOTIFICATION_COOLDOWN_SECONDS", v)?,
            (None, Some(v)) => parse_u64("NOTIFICATION_COOLDOWN", v)?,
            (None, None) => DEFAULT_COOLDOWN_SECS,
        };
        let notifier = match get("NOTIFIER").map(str::to_ascii_lowercase).as_deref() {
            None | Some("auto") => NotifierKind::Auto,
            Some("command") => NotifierKind::Command,
            Some("log") => NotifierKind::Log,
            Some(other) => {
                return Err(anyhow!(
                    "NOTIFIER must be 'auto', 'command' or 'log', got '{}'",
                    other
                ))
            }
        };
        let actions = ActionSettings {
            snapshot_on_detection: get("SNAPSHOT_ON_DETECTION")
                .map(|v| parse_bool("SNAPSHOT_ON_DETECTION", v))
                .transpose()?
                .unwrap_or(false),
            snapshot_directory: PathBuf::from(
                get("SNAPSHOT_DIRECTORY").unwrap_or(DEFAULT_SNAPSHOT_DIR),
            ),
            cooldown: Duration::from_secs(cooldown_secs),
            cooldown_scope: get("COOLDOWN_SCOPE")
                .map(CooldownScope::from_str)
                .transpose()?
                .unwrap_or_default(),
            notifier,
            alert_recipients: alert_recipients(values)?,
            alert_script: PathBuf::from(get("ALERT_SCRIPT").unwrap_or(DEFAULT_ALERT_SCRIPT)),
        };

        let zone = ZoneSettings {
            zone_config: get("ZONE_CONFIG").map(PathBuf::from),
            mode: get("ZONE_VIOLATION_MODE")
                .map(ZoneMode::from_str)
                .transpose()?
                .unwrap_or_default(),
        };

        Ok(Self {
            stream,
            detection,
            actions,
            zone,
        })
    }

    /// Filter policy described by this configuration.
    pub fn policy(&self) -> Result<DetectionPolicy> {
        Ok(
            DetectionPolicy::new(self.detection.threshold, self.detection.objects.iter().copied())?
                .with_zone_mode(self.zone.mode),
        )
    }
}

/// Parse `KEY=value` lines. `#` starts a comment line, blank lines are ignored, an
/// optional `export ` prefix and surrounding quotes are stripped.
pub fn parse_env_file(raw: &str) -> Result<BTreeMap<String, String>> {
    let mut values = BTreeMap::new();
    for (index, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| anyhow!("line {}: expected KEY=value", index + 1))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(anyhow!("line {}: empty key", index + 1));
        }
        let value = unquote(value.trim());
        if value.is_empty() {
            continue;
        }
        values.insert(key.to_string(), value);
    }
    Ok(values)
}

fn unquote(value: &str) -> String {
    for quote in ['"', '\''] {
        if let Some(rest) = value.strip_prefix(quote) {
            // Anything after the closing quote is a comment.
            if let Some(end) = rest.find(quote) {
                return rest[..end].to_string();
            }
        }
    }
    // Unquoted values may carry a trailing ` # comment`.
    match value.find(" #") {
        Some(pos) => value[..pos].trim_end().to_string(),
        None => value.to_string(),
    }
}

/// Environment variables win over file values, as with dotenv loaders.
fn apply_env(values: &mut BTreeMap<String, String>) {
    for (key, value) in std::env::vars() {
        let known = KNOWN_KEYS.contains(&key.as_str()) || key.starts_with(ALERT_RECIPIENT_PREFIX);
        if known && !value.trim().is_empty() {
            values.insert(key, value.trim().to_string());
        }
    }
}

fn alert_recipients(values: &BTreeMap<String, String>) -> Result<Vec<String>> {
    let mut numbered = Vec::new();
    for (key, value) in values {
        let Some(suffix) = key.strip_prefix(ALERT_RECIPIENT_PREFIX) else {
            continue;
        };
        let n: u32 = suffix
            .parse()
            .map_err(|_| anyhow!("{} must end in a number", key))?;
        numbered.push((n, value.clone()));
    }
    numbered.sort_by_key(|(n, _)| *n);
    Ok(numbered.into_iter().map(|(_, recipient)| recipient).collect())
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Ok(true),
        "false" | "no" | "0" | "off" => Ok(false),
        other => Err(anyhow!("{} must be true or false, got '{}'", key, other)),
    }
}

fn parse_u64(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| anyhow!("{} must be an integer number of seconds, got '{}'", key, value))
}

fn parse_positive<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr + PartialOrd + Default,
{
    let parsed: T = value
        .trim()
        .parse()
        .map_err(|_| anyhow!("{} must be a positive integer, got '{}'", key, value))?;
    if parsed <= T::default() {
        return Err(anyhow!("{} must be greater than zero", key));
    }
    Ok(parsed)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(raw: &str) -> BTreeMap<String, String> {
        parse_env_file(raw).unwrap()
    }

    #[test]
    fn parses_comments_quotes_and_exports() {
        let parsed = values(
            r#"
# camera
RTSP_FEED_URL="rtsp://192.168.1.20:554/stream1"
export CAM_USERNAME=admin
DETECTION_THRESHOLD=0.7 # fairly strict

SNAPSHOT_DIRECTORY='/tmp/snaps'
EMPTY=
"#,
        );
        assert_eq!(parsed["RTSP_FEED_URL"], "rtsp://192.168.1.20:554/stream1");
        assert_eq!(parsed["CAM_USERNAME"], "admin");
        assert_eq!(parsed["DETECTION_THRESHOLD"], "0.7");
        assert_eq!(parsed["SNAPSHOT_DIRECTORY"], "/tmp/snaps");
        assert!(!parsed.contains_key("EMPTY"));
    }

    #[test]
    fn quoted_values_may_carry_comments() {
        let parsed = values(
            "SNAPSHOT_DIRECTORY=\"/tmp/my snaps\" # on the SSD\nALERT_SCRIPT='./alert #2.sh'\n",
        );
        assert_eq!(parsed["SNAPSHOT_DIRECTORY"], "/tmp/my snaps");
        assert_eq!(parsed["ALERT_SCRIPT"], "./alert #2.sh");
    }

    #[test]
    fn rejects_lines_without_equals() {
        assert!(parse_env_file("RTSP_FEED_URL rtsp://x").is_err());
    }

    #[test]
    fn defaults_apply_with_only_the_url() {
        let cfg = MonitorConfig::from_values(&values("RTSP_FEED_URL=rtsp://cam/stream")).unwrap();
        assert_eq!(cfg.stream.source, SourceKind::Ffmpeg);
        assert_eq!(cfg.stream.frame_rate, 1);
        assert_eq!(cfg.stream.geometry, None);
        assert_eq!(cfg.stream.reconnect_delay, Duration::from_secs(5));
        assert_eq!(cfg.detection.threshold, 0.5);
        assert!(cfg.detection.objects.is_empty());
        assert!(!cfg.actions.snapshot_on_detection);
        assert_eq!(cfg.actions.cooldown, Duration::from_secs(300));
        assert_eq!(cfg.actions.cooldown_scope, CooldownScope::PerClass);
        assert_eq!(cfg.zone.mode, ZoneMode::Exclusive);
    }

    #[test]
    fn url_is_required_for_the_decoder_source_only() {
        assert!(MonitorConfig::from_values(&values("FRAME_RATE=2")).is_err());
        let cfg = MonitorConfig::from_values(&values("FRAME_SOURCE=socket")).unwrap();
        assert_eq!(cfg.stream.source, SourceKind::Socket);
        assert_eq!(cfg.stream.socket_path, PathBuf::from("/tmp/aicam.sock"));
    }

    #[test]
    fn threshold_must_be_a_probability() {
        let base = "RTSP_FEED_URL=rtsp://cam\n";
        assert!(MonitorConfig::from_values(&values(&format!("{base}DETECTION_THRESHOLD=1.5"))).is_err());
        assert!(MonitorConfig::from_values(&values(&format!("{base}DETECTION_THRESHOLD=high"))).is_err());
        let cfg = MonitorConfig::from_values(&values(&format!("{base}DETECTION_THRESHOLD=1"))).unwrap();
        assert_eq!(cfg.detection.threshold, 1.0);
    }

    #[test]
    fn object_typos_are_startup_errors() {
        let ok = MonitorConfig::from_values(&values(
            "RTSP_FEED_URL=rtsp://cam\nOBJECTS_TO_MONITOR=person, car ,cell phone",
        ))
        .unwrap();
        assert_eq!(
            ok.detection.objects,
            vec![ObjectClass::Person, ObjectClass::Car, ObjectClass::CellPhone]
        );
        assert!(MonitorConfig::from_values(&values(
            "RTSP_FEED_URL=rtsp://cam\nOBJECTS_TO_MONITOR=person,persn"
        ))
        .is_err());
    }

    #[test]
    fn seconds_suffixed_cooldown_wins() {
        let cfg = MonitorConfig::from_values(&values(
            "RTSP_FEED_URL=rtsp://cam\nNOTIFICATION_COOLDOWN=60\nNOTIFICATION_COOLDOWN_SECONDS=120",
        ))
        .unwrap();
        assert_eq!(cfg.actions.cooldown, Duration::from_secs(120));
        let cfg = MonitorConfig::from_values(&values("RTSP_FEED_URL=rtsp://cam\nNOTIFICATION_COOLDOWN=60"))
            .unwrap();
        assert_eq!(cfg.actions.cooldown, Duration::from_secs(60));
    }

    #[test]
    fn geometry_needs_both_dimensions() {
        assert!(MonitorConfig::from_values(&values("RTSP_FEED_URL=rtsp://cam\nFRAME_WIDTH=640")).is_err());
        assert!(MonitorConfig::from_values(&values(
            "RTSP_FEED_URL=rtsp://cam\nFRAME_WIDTH=641\nFRAME_HEIGHT=480\nFRAME_PIXEL_FORMAT=nv12"
        ))
        .is_err());
        let cfg = MonitorConfig::from_values(&values(
            "RTSP_FEED_URL=rtsp://cam\nFRAME_WIDTH=640\nFRAME_HEIGHT=480",
        ))
        .unwrap();
        assert_eq!(cfg.stream.geometry, Some((640, 480)));
    }

    #[test]
    fn alert_recipients_are_ordered_numerically() {
        let cfg = MonitorConfig::from_values(&values(
            "RTSP_FEED_URL=rtsp://cam\nALERT_RECIPIENT_10=+15550010\nALERT_RECIPIENT_2=+15550002\nALERT_RECIPIENT_1=me@example.com",
        ))
        .unwrap();
        assert_eq!(
            cfg.actions.alert_recipients,
            vec!["me@example.com", "+15550002", "+15550010"]
        );
        assert!(MonitorConfig::from_values(&values(
            "RTSP_FEED_URL=rtsp://cam\nALERT_RECIPIENT_MOM=+1555"
        ))
        .is_err());
    }

    #[test]
    fn booleans_accept_common_spellings() {
        for (raw, expected) in [("true", true), ("YES", true), ("1", true), ("off", false), ("False", false)] {
            assert_eq!(parse_bool("K", raw).unwrap(), expected);
        }
        assert!(parse_bool("K", "maybe").is_err());
    }

    #[test]
    fn policy_reflects_config() {
        let cfg = MonitorConfig::from_values(&values(
            "RTSP_FEED_URL=rtsp://cam\nDETECTION_THRESHOLD=0.7\nOBJECTS_TO_MONITOR=person\nZONE_VIOLATION_MODE=priority",
        ))
        .unwrap();
        let policy = cfg.policy().unwrap();
        assert_eq!(policy.threshold(), 0.7);
        assert!(policy.allow_list().contains(&ObjectClass::Person));
        assert_eq!(policy.zone_mode(), ZoneMode::Priority);
    }
}
