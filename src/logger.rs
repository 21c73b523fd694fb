use chrono::Local;
use env_logger::{Builder, Target};
use log::LevelFilter;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Copies every log line to stderr and the log file.
struct Tee {
    file: File,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}

fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Installs the global logger. `RUST_LOG` overrides the default level.
pub fn init(log_file: &Path, verbose: bool) {
    let level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };
    let mut builder = Builder::new();
    builder
        .format(|buf, record| {
            writeln!(buf,
                "{} [{}] - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter(None, level)
        .filter(Some("chromiumoxide"), LevelFilter::Warn)
        .parse_default_env();

    let file_error = match open_log_file(log_file) {
        Ok(file) => {
            builder.target(Target::Pipe(Box::new(Tee { file })));
            None
        }
        Err(e) => Some(e),
    };
    builder.init();

    match file_error {
        None => log::info!("Logger initialized. Writing to {:?}", log_file),
        Some(e) => log::warn!("Could not open log file {:?}: {}. Logging to stderr only.", log_file, e),
    }
}
