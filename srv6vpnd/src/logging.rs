use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use clap::ValueEnum;
use serde_json::json;
use tracing::{Event, Level, Subscriber};
use tracing_appender::rolling;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::registry::LookupSpan;

const SERVICE: &str = "srv6vpnd";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoggingOutput {
    Stdout,
    Syslog,
    File(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Json,
    Terminal,
    Elasticsearch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogOutputType {
    Stdout,
    Syslog,
    File,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub output: LoggingOutput,
    pub format: LogFormat,
}

impl LoggingConfig {
    pub fn from_args(output: LogOutputType, file: Option<&str>, format: LogFormat) -> Self {
        let output = match output {
            LogOutputType::Stdout => LoggingOutput::Stdout,
            LogOutputType::Syslog => LoggingOutput::Syslog,
            LogOutputType::File => LoggingOutput::File(file.unwrap_or("srv6vpnd.log").to_string()),
        };
        Self { output, format }
    }
}

/// Elasticsearch-style JSON document per event.
#[derive(Default)]
pub struct ElasticsearchFormatter;

impl<S, N> FormatEvent<S, N> for ElasticsearchFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let metadata = event.metadata();
        let now = Utc::now();
        let level = metadata.level().to_string().to_lowercase();

        let mut visitor = JsonVisitor::default();
        event.record(&mut visitor);

        let mut doc = json!({
            "@timestamp": now.to_rfc3339(),
            "level": level,
            "target": metadata.target(),
            "message": visitor.message.unwrap_or_default(),
            "service": {
                "name": SERVICE,
                "type": "routing-daemon",
                "version": env!("CARGO_PKG_VERSION")
            },
            "host": {
                "hostname": hostname::get().unwrap_or_default().to_string_lossy().into_owned()
            },
            "process": {
                "pid": std::process::id()
            },
            "@metadata": {
                "index": format!("{}-{}", SERVICE, now.format("%Y.%m.%d")),
                "type": "_doc"
            }
        });
        if !visitor.fields.is_empty() {
            doc["fields"] = json!(visitor.fields);
        }
        writeln!(writer, "{}", doc)
    }
}

#[derive(Default)]
struct JsonVisitor {
    message: Option<String>,
    fields: HashMap<String, serde_json::Value>,
}

impl tracing::field::Visit for JsonVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{:?}", value));
        } else {
            self.fields
                .insert(field.name().to_string(), json!(format!("{:?}", value)));
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields.insert(field.name().to_string(), json!(value));
        }
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.fields.insert(field.name().to_string(), json!(value));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.fields.insert(field.name().to_string(), json!(value));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.fields.insert(field.name().to_string(), json!(value));
    }
}

#[cfg(unix)]
struct SyslogWriter {
    logger: Mutex<syslog::Logger<syslog::LoggerBackend, syslog::Formatter3164>>,
}

#[cfg(unix)]
impl SyslogWriter {
    fn new() -> anyhow::Result<Self> {
        let formatter = syslog::Formatter3164 {
            facility: syslog::Facility::LOG_DAEMON,
            hostname: None,
            process: SERVICE.to_string(),
            pid: std::process::id(),
        };
        let logger = syslog::unix(formatter)
            .map_err(|e| anyhow::anyhow!("Failed to connect to syslog: {}", e))?;
        Ok(SyslogWriter {
            logger: Mutex::new(logger),
        })
    }
}

#[cfg(unix)]
impl io::Write for SyslogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Ok(mut logger) = self.logger.lock() {
            let msg = String::from_utf8_lossy(buf);
            let _ = logger.info(msg.trim());
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn writable(dir: &Path) -> bool {
    if std::fs::create_dir_all(dir).is_err() {
        return false;
    }
    let probe = dir.join(".srv6vpnd_write_test");
    let ok = std::fs::write(&probe, "test").is_ok();
    let _ = std::fs::remove_file(&probe);
    ok
}

/// Absolute paths are used as given. Relative ones try the current
/// directory, then ~/.srv6vpnd, then /var/log.
pub fn log_file_path(path: &str) -> anyhow::Result<PathBuf> {
    let path_obj = Path::new(path);
    if path_obj.is_absolute() {
        let parent = path_obj
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Invalid log file path: {}", path))?;
        if !writable(parent) {
            anyhow::bail!("Cannot write to log directory: {}", parent.display());
        }
        return Ok(path_obj.to_path_buf());
    }

    let mut candidates = vec![PathBuf::from(".").join(path)];
    if let Some(mut home) = dirs::home_dir() {
        home.push(".srv6vpnd");
        home.push(path);
        candidates.push(home);
    }
    candidates.push(PathBuf::from("/var/log").join(path));

    candidates
        .into_iter()
        .find(|candidate| candidate.parent().map(writable).unwrap_or(false))
        .ok_or_else(|| anyhow::anyhow!("Cannot find writable directory for log file: {}", path))
}

fn make_writer(output: &LoggingOutput) -> anyhow::Result<BoxMakeWriter> {
    match output {
        LoggingOutput::Stdout => Ok(BoxMakeWriter::new(io::stdout)),
        LoggingOutput::Syslog => {
            #[cfg(unix)]
            {
                Ok(BoxMakeWriter::new(Mutex::new(SyslogWriter::new()?)))
            }
            #[cfg(not(unix))]
            {
                Err(anyhow::anyhow!("Syslog is only supported on Unix systems"))
            }
        }
        LoggingOutput::File(path) => {
            let path = log_file_path(path)?;
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            let file = path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("Invalid log filename"))?;
            Ok(BoxMakeWriter::new(rolling::never(dir, file)))
        }
    }
}

pub fn setup_tracing(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let writer = make_writer(&config.output)?;
    let ansi = config.output == LoggingOutput::Stdout;

    let result = match config.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_writer(writer)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .with_ansi(false)
            .try_init(),
        LogFormat::Elasticsearch => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .event_format(ElasticsearchFormatter)
            .with_writer(writer)
            .try_init(),
        LogFormat::Terminal => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .with_ansi(ansi)
            .try_init(),
    };
    result.map_err(|e| anyhow::anyhow!("Failed to set tracing subscriber: {}", e))
}

/// Daemon mode defaults to syslog, interactive mode to stdout. A failed
/// output falls back to a log file, then to discarding logs.
pub fn tracing_set(daemon_mode: bool, config: Option<LoggingConfig>) {
    let config = config.unwrap_or(LoggingConfig {
        output: if daemon_mode {
            LoggingOutput::Syslog
        } else {
            LoggingOutput::Stdout
        },
        format: LogFormat::Terminal,
    });

    if let Err(e) = setup_tracing(&config) {
        eprintln!("Failed to setup {:?} logging: {}", config.output, e);
        let fallback = LoggingConfig {
            output: if daemon_mode {
                LoggingOutput::File(format!("{}.log", SERVICE))
            } else {
                LoggingOutput::Stdout
            },
            format: LogFormat::Terminal,
        };
        if let Err(e) = setup_tracing(&fallback) {
            eprintln!("Failed to setup fallback logging: {}, discarding logs", e);
            let _ = tracing_subscriber::fmt()
                .with_max_level(Level::INFO)
                .with_writer(io::sink)
                .try_init();
        }
    }
}
