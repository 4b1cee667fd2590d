//! Sequential per-line download loop.

use std::fs::{self, File};
use std::io::{self, BufRead};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::BatchSummary;
use crate::config::AppConfig;
use crate::error::LineError;
use crate::synth::SpeechApi;

/// Settings for a batch run.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub output_dir: PathBuf,        // Directory receiving the .mp3 files
    pub delay: Duration,            // Pause between consecutive requests
    pub rate_limit_pause: Duration, // Extra pause after a rate-limited line
}

impl From<&AppConfig> for BatchOptions {
    fn from(config: &AppConfig) -> Self {
        Self { output_dir: config.output_dir.clone(), delay: config.delay(), rate_limit_pause: config.rate_limit_pause() }
    }
}

/// Turns input lines into audio files, one request at a time.
pub struct Downloader<A: SpeechApi> {
    api: A,
    options: BatchOptions,
}

impl<A: SpeechApi> Downloader<A> {
    pub fn new(api: A, options: BatchOptions) -> Self {
        Self { api, options }
    }

    /// Output path for a line: the trimmed text with an `.mp3` suffix.
    pub fn output_path(&self, text: &str) -> PathBuf {
        output_path(&self.options.output_dir, text)
    }

    /// Fetch audio for one line and save it.
    ///
    /// Nothing is written unless the endpoint answered 200. A partially
    /// written file is removed if the body cannot be copied.
    ///
    /// # Returns
    /// Path of the saved file.
    pub fn process_line(&self, text: &str) -> Result<PathBuf, LineError> {
        let path = self.output_path(text);
        let output_err = |source: io::Error| LineError::OutputFile { text: text.to_string(), path: path.clone(), source };

        if !stays_inside(text.trim()) {
            return Err(output_err(io::Error::new(io::ErrorKind::InvalidInput, "file name would leave the output directory")));
        }

        let mut body = self.api.fetch(text)?;
        let mut file = File::create(&path).map_err(output_err)?;
        if let Err(e) = io::copy(&mut body, &mut file) {
            drop(file);
            if let Err(remove_err) = fs::remove_file(&path) {
                debug!("Could not remove partial file {}: {}", path.display(), remove_err);
            }
            return Err(output_err(e));
        }

        Ok(path)
    }

    /// Process every line of `input`.
    ///
    /// Failed lines, including lines that are not valid UTF-8, are logged and
    /// skipped; only an I/O error reading `input` itself stops the run.
    pub fn run<R: BufRead>(&self, input: R) -> io::Result<BatchSummary> {
        let mut summary = BatchSummary::default();
        let mut first_request = true;

        for (index, raw) in input.split(b'\n').enumerate() {
            let mut raw = raw?;
            let line_no = index + 1;
            if raw.last() == Some(&b'\r') {
                raw.pop();
            }

            let line = match String::from_utf8(raw) {
                Ok(line) => line,
                Err(e) => {
                    let err = LineError::InvalidText { text: String::from_utf8_lossy(e.as_bytes()).into_owned() };
                    warn!("❌ Line {}: {}", line_no, err);
                    summary.record_failure(line_no, &err);
                    continue;
                }
            };

            if line.trim().is_empty() {
                debug!("Line {}: blank, skipped", line_no);
                summary.record_skipped();
                continue;
            }

            if !first_request && !self.options.delay.is_zero() {
                std::thread::sleep(self.options.delay);
            }
            first_request = false;

            match self.process_line(&line) {
                Ok(path) => {
                    info!("✅ Line {}: generated audio file \"{}\"", line_no, path.display());
                    summary.record_saved(path);
                }
                Err(e) => {
                    warn!("❌ Line {}: {}", line_no, e);
                    summary.record_failure(line_no, &e);

                    if e.is_rate_limited() && !self.options.rate_limit_pause.is_zero() {
                        info!("Rate limited, pausing for {}ms", self.options.rate_limit_pause.as_millis());
                        std::thread::sleep(self.options.rate_limit_pause);
                    }
                }
            }
        }

        Ok(summary)
    }
}

fn output_path(output_dir: &Path, text: &str) -> PathBuf {
    output_dir.join(format!("{}.mp3", text.trim()))
}

/// True when `name` joined onto a directory cannot resolve outside of it.
fn stays_inside(name: &str) -> bool {
    Path::new(name).components().all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::io::{Cursor, Read};

    use super::*;

    enum Reply {
        Audio(Vec<u8>),
        Status(u16),
        Broken,
    }

    /// In-memory stand-in for the synthesis endpoint.
    #[derive(Default)]
    struct FakeApi {
        replies: HashMap<String, Reply>,
        requested: RefCell<Vec<String>>,
    }

    impl FakeApi {
        fn reply(mut self, text: &str, reply: Reply) -> Self {
            self.replies.insert(text.to_string(), reply);
            self
        }
    }

    /// Yields a few bytes, then fails.
    struct BrokenBody(usize);

    impl Read for BrokenBody {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.0 == 0 {
                return Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset"));
            }
            self.0 -= 1;
            buf[0] = b'x';
            Ok(1)
        }
    }

    impl SpeechApi for FakeApi {
        fn fetch(&self, text: &str) -> Result<Box<dyn Read>, LineError> {
            self.requested.borrow_mut().push(text.to_string());
            match self.replies.get(text) {
                Some(Reply::Audio(bytes)) => Ok(Box::new(Cursor::new(bytes.clone()))),
                Some(Reply::Status(429)) => Err(LineError::RateLimited { text: text.to_string(), detail: "HTTP status 429".to_string() }),
                Some(Reply::Status(status)) => Err(LineError::HttpStatus { text: text.to_string(), status: *status }),
                Some(Reply::Broken) => Ok(Box::new(BrokenBody(4))),
                None => Err(LineError::transport(text, "no route".to_string())),
            }
        }
    }

    fn options(dir: &Path) -> BatchOptions {
        BatchOptions { output_dir: dir.to_path_buf(), delay: Duration::ZERO, rate_limit_pause: Duration::ZERO }
    }

    #[test]
    fn test_saves_trimmed_name_with_exact_body() {
        let dir = tempfile::tempdir().unwrap();
        let api = FakeApi::default().reply("  你好, world!  ", Reply::Audio(b"mp3-bytes".to_vec()));
        let downloader = Downloader::new(api, options(dir.path()));

        let path = downloader.process_line("  你好, world!  ").unwrap();

        assert_eq!(path, dir.path().join("你好, world!.mp3"));
        assert_eq!(fs::read(&path).unwrap(), b"mp3-bytes");
        assert_eq!(downloader.api.requested.borrow().as_slice(), ["  你好, world!  "]);
    }

    #[test]
    fn test_rate_limited_line_creates_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = Downloader::new(FakeApi::default().reply("slow", Reply::Status(429)), options(dir.path()));

        let err = downloader.process_line("slow").unwrap_err();
        assert!(err.is_rate_limited());
        assert!(!dir.path().join("slow.mp3").exists());
    }

    #[test]
    fn test_server_error_creates_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = Downloader::new(FakeApi::default().reply("boom", Reply::Status(500)), options(dir.path()));

        match downloader.process_line("boom").unwrap_err() {
            LineError::HttpStatus { status, .. } => assert_eq!(status, 500),
            other => panic!("unexpected error: {}", other),
        }
        assert!(!dir.path().join("boom.mp3").exists());
    }

    #[test]
    fn test_rerun_overwrites_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.mp3");
        fs::write(&path, b"an older and much longer clip from a previous run").unwrap();

        let downloader = Downloader::new(FakeApi::default().reply("hello", Reply::Audio(b"fresh".to_vec())), options(dir.path()));
        downloader.process_line("hello").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"fresh");
    }

    #[test]
    fn test_broken_body_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = Downloader::new(FakeApi::default().reply("cut", Reply::Broken), options(dir.path()));

        let err = downloader.process_line("cut").unwrap_err();
        assert_eq!(err.kind(), "output_file");
        assert!(!dir.path().join("cut.mp3").exists());
    }

    #[test]
    fn test_missing_output_dir_is_output_error() {
        let dir = tempfile::tempdir().unwrap();
        let api = FakeApi::default().reply("a", Reply::Audio(b"x".to_vec()));
        let downloader = Downloader::new(api, options(&dir.path().join("missing")));

        assert_eq!(downloader.process_line("a").unwrap_err().kind(), "output_file");
    }

    #[test]
    fn test_run_skips_blank_lines_and_continues_after_failures() {
        let dir = tempfile::tempdir().unwrap();
        let api = FakeApi::default()
            .reply("first", Reply::Audio(b"1".to_vec()))
            .reply("second", Reply::Status(500))
            .reply("third", Reply::Status(429))
            .reply("fourth", Reply::Audio(b"4".to_vec()));
        let downloader = Downloader::new(api, options(dir.path()));

        let input = "first\r\n\n   \nsecond\nthird\nfourth";
        let summary = downloader.run(Cursor::new(input)).unwrap();

        assert_eq!(summary.processed, 4);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.saved, vec![dir.path().join("first.mp3"), dir.path().join("fourth.mp3")]);
        assert_eq!(summary.failures.len(), 2);
        assert_eq!((summary.failures[0].line, summary.failures[0].kind.as_str()), (4, "http_status"));
        assert_eq!((summary.failures[1].line, summary.failures[1].kind.as_str()), (5, "rate_limited"));
        assert!(!summary.is_success());

        assert_eq!(downloader.api.requested.borrow().as_slice(), ["first", "second", "third", "fourth"]);
        assert_eq!(fs::read(dir.path().join("fourth.mp3")).unwrap(), b"4");
    }

    #[test]
    fn test_run_all_saved_is_success() {
        let dir = tempfile::tempdir().unwrap();
        let api = FakeApi::default().reply("a", Reply::Audio(b"a".to_vec())).reply("b", Reply::Audio(b"b".to_vec()));
        let summary = Downloader::new(api, options(dir.path())).run(Cursor::new("a\nb\n")).unwrap();

        assert!(summary.is_success());
        assert_eq!(summary.saved.len(), 2);
    }

    #[test]
    fn test_output_path_uses_raw_trimmed_text() {
        let path = output_path(Path::new("out"), "\t早上好 world?  ");
        assert_eq!(path, Path::new("out").join("早上好 world?.mp3"));
    }

    #[test]
    fn test_absolute_line_stays_in_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let elsewhere = tempfile::tempdir().unwrap();
        let target = elsewhere.path().join("escaped");
        let text = target.to_str().unwrap().to_string();

        let api = FakeApi::default().reply(&text, Reply::Audio(b"x".to_vec()));
        let downloader = Downloader::new(api, options(dir.path()));

        let err = downloader.process_line(&text).unwrap_err();
        assert_eq!(err.kind(), "output_file");
        assert!(!elsewhere.path().join("escaped.mp3").exists());
        assert!(downloader.api.requested.borrow().is_empty());
    }

    #[test]
    fn test_parent_components_rejected() {
        assert!(!stays_inside("../up"));
        assert!(!stays_inside("a/../../up"));
        assert!(!stays_inside("/abs"));
        assert!(stays_inside("你好, world!"));
        assert!(stays_inside("v1.2 notes"));
    }

    #[test]
    fn test_invalid_utf8_line_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let api = FakeApi::default().reply("first", Reply::Audio(b"1".to_vec())).reply("third", Reply::Audio(b"3".to_vec()));
        let downloader = Downloader::new(api, options(dir.path()));

        let summary = downloader.run(Cursor::new(&b"first\n\xff\xfebad\r\nthird\n"[..])).unwrap();

        assert_eq!(summary.saved, vec![dir.path().join("first.mp3"), dir.path().join("third.mp3")]);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!((summary.failures[0].line, summary.failures[0].kind.as_str()), (2, "invalid_text"));
        assert!(summary.failures[0].text.ends_with("bad"));
        assert_eq!(downloader.api.requested.borrow().as_slice(), ["first", "third"]);
    }
}
