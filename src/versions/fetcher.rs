//! Streaming archive downloads with progress reporting

use std::fs;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use super::{DownloadError, VersionDescriptor};
use crate::logging::{log_download, log_error};
use crate::utils::USER_AGENT;

const BUFFER_SIZE: usize = 65536; // 64KB buffer for faster downloads

/// Progress of a running download
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DownloadProgress {
    /// 0-100
    Percent(f64),
    /// Server did not announce a size
    Indeterminate,
}

/// Downloads release archives into a scratch directory.
///
/// Archives always land in a uniquely named temporary file, never in the
/// version cache, so a failed or partial download cannot damage a cached version.
pub struct ArchiveFetcher {
    temp_dir: PathBuf,
}

impl ArchiveFetcher {
    pub fn new(temp_dir: PathBuf) -> Self {
        Self { temp_dir }
    }

    /// Downloads `version`'s archive and returns the temporary file path.
    ///
    /// The caller owns the returned file and should delete it when done.
    pub fn download<F>(&self, version: &VersionDescriptor, on_progress: F) -> Result<PathBuf, DownloadError>
    where
        F: Fn(DownloadProgress),
    {
        if version.download_url.is_empty() {
            return Err(DownloadError::NoUrl);
        }

        fs::create_dir_all(&self.temp_dir)?;
        let temp_path = self.temp_dir.join(temp_file_name(&version.tag_name, &version.download_url));

        let response = match ureq::get(&version.download_url)
            .set("User-Agent", USER_AGENT)
            .call()
        {
            Ok(resp) => resp,
            Err(ureq::Error::Status(code, _)) => {
                log_error(&format!("Download of {} failed with HTTP {}", version.tag_name, code));
                return Err(DownloadError::HttpStatus(code));
            }
            Err(e) => return Err(DownloadError::Transport(e.to_string())),
        };

        check_content_type(response.header("Content-Type"))?;

        let total_size = response
            .header("Content-Length")
            .and_then(|s| s.trim().parse::<u64>().ok());

        log_download(&format!(
            "Fetching {} ({}) -> {:?}",
            version.download_url,
            total_size.map_or_else(|| "unknown size".to_string(), |t| format!("{} bytes", t)),
            temp_path
        ));

        let mut file = fs::File::create(&temp_path)?;
        let mut reader = response.into_reader();

        match stream_to_file(&mut reader, &mut file, total_size, &on_progress) {
            Ok(bytes) => {
                drop(file);
                log_download(&format!("Downloaded {} bytes for {}", bytes, version.tag_name));
                Ok(temp_path)
            }
            Err(e) => {
                drop(file);
                let _ = fs::remove_file(&temp_path);
                log_error(&format!("Download of {} failed: {}", version.tag_name, e));
                Err(e)
            }
        }
    }
}

/// Rejects `text/*` responses; those are error pages or API rate-limit notices,
/// not archives.
pub fn check_content_type(content_type: Option<&str>) -> Result<(), DownloadError> {
    if let Some(ct) = content_type {
        let mime = ct.split(';').next().unwrap_or("").trim().to_lowercase();
        if mime.starts_with("text/") {
            return Err(DownloadError::TextContent(mime));
        }
    }
    Ok(())
}

/// Copies `reader` into `writer`, reporting progress after every chunk.
///
/// With a known `total` a short stream is an error.
pub fn stream_to_file<R, W, F>(
    reader: &mut R,
    writer: &mut W,
    total: Option<u64>,
    on_progress: &F,
) -> Result<u64, DownloadError>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
    F: Fn(DownloadProgress) + ?Sized,
{
    if total.is_none() {
        on_progress(DownloadProgress::Indeterminate);
    }

    let mut buffer = [0; BUFFER_SIZE];
    let mut downloaded: u64 = 0;

    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                return Err(DownloadError::Truncated {
                    expected: total.unwrap_or(downloaded),
                    received: downloaded,
                });
            }
            Err(e) => return Err(e.into()),
        };
        writer.write_all(&buffer[..bytes_read])?;
        downloaded += bytes_read as u64;

        if let Some(total) = total.filter(|t| *t > 0) {
            let percent = (downloaded as f64 / total as f64 * 100.0).min(100.0);
            on_progress(DownloadProgress::Percent(percent));
        }
    }

    if let Some(expected) = total {
        if downloaded < expected {
            return Err(DownloadError::Truncated {
                expected,
                received: downloaded,
            });
        }
    }

    writer.flush()?;
    Ok(downloaded)
}

/// `<tag>-<random>.<ext>`, keeping the archive extension from the URL
fn temp_file_name(tag: &str, url: &str) -> String {
    let safe_tag: String = tag
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect();

    let last_segment = url
        .split(['?', '#'])
        .next()
        .and_then(|u| u.rsplit('/').next())
        .unwrap_or("");
    let ext = Path::new(last_segment)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .filter(|e| e == "7z" || e == "zip")
        .unwrap_or_else(|| "zip".to_string());

    format!("{}-{:016x}.{}", safe_tag, rand::random::<u64>(), ext)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Utc;
    use std::io::{BufRead, BufReader, Cursor};
    use std::net::TcpListener;
    use std::sync::Mutex;

    fn version(url: &str) -> VersionDescriptor {
        VersionDescriptor {
            tag_name: "v0.7.9".to_string(),
            name: "v0.7.9".to_string(),
            description: String::new(),
            published_at: Utc::now(),
            download_url: url.to_string(),
            size: 0,
            origin: "primary".to_string(),
            local_path: None,
            is_downloaded: false,
        }
    }

    /// Serves a single canned HTTP response and returns the base URL.
    pub(crate) fn serve_once(head: String, body: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            if let Ok((stream, _)) = listener.accept() {
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut line = String::new();
                while reader.read_line(&mut line).map(|n| n > 0).unwrap_or(false) {
                    if line == "\r\n" {
                        break;
                    }
                    line.clear();
                }
                let mut stream = stream;
                let _ = stream.write_all(head.as_bytes());
                let _ = stream.write_all(&body);
                let _ = stream.flush();
            }
        });
        format!("http://{}", addr)
    }

    fn leftover_files(dir: &Path) -> usize {
        fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    #[test]
    fn test_content_type_check() {
        assert!(check_content_type(None).is_ok());
        assert!(check_content_type(Some("application/octet-stream")).is_ok());
        assert!(check_content_type(Some("application/zip")).is_ok());
        assert!(matches!(
            check_content_type(Some("Text/HTML; charset=utf-8")),
            Err(DownloadError::TextContent(m)) if m == "text/html"
        ));
    }

    #[test]
    fn test_stream_reports_percent() {
        let data = vec![7u8; BUFFER_SIZE * 2 + 10];
        let mut out = Vec::new();
        let seen = Mutex::new(Vec::new());

        let written = stream_to_file(
            &mut Cursor::new(data.clone()),
            &mut out,
            Some(data.len() as u64),
            &|p| seen.lock().unwrap().push(p),
        )
        .unwrap();

        assert_eq!(written, data.len() as u64);
        assert_eq!(out, data);
        let seen = seen.into_inner().unwrap();
        assert!(seen.len() >= 2);
        assert_eq!(seen.last(), Some(&DownloadProgress::Percent(100.0)));
    }

    #[test]
    fn test_stream_unknown_length_is_indeterminate() {
        let mut out = Vec::new();
        let seen = Mutex::new(Vec::new());
        stream_to_file(&mut Cursor::new(vec![1u8; 100]), &mut out, None, &|p| {
            seen.lock().unwrap().push(p)
        })
        .unwrap();
        assert_eq!(seen.into_inner().unwrap(), vec![DownloadProgress::Indeterminate]);
        assert_eq!(out.len(), 100);
    }

    #[test]
    fn test_stream_detects_truncation() {
        let mut out = Vec::new();
        let err = stream_to_file(&mut Cursor::new(vec![1u8; 10]), &mut out, Some(50), &|_| {})
            .unwrap_err();
        assert!(matches!(err, DownloadError::Truncated { expected: 50, received: 10 }));
    }

    #[test]
    fn test_temp_file_name_keeps_extension() {
        let a = temp_file_name("v0.7.9", "https://github.com/x/releases/download/v0.7.9/OptiScaler_0.7.9.7z");
        let b = temp_file_name("v0.7.9", "https://github.com/x/releases/download/v0.7.9/OptiScaler_0.7.9.7z");
        assert!(a.starts_with("v0.7.9-") && a.ends_with(".7z"));
        assert_ne!(a, b);
        assert!(temp_file_name("a/b", "https://x/file?download=1").ends_with(".zip"));
        assert!(temp_file_name("a/b", "https://x/file").starts_with("a_b-"));
    }

    #[test]
    fn test_download_success() {
        let body = vec![0x50u8; 200_000];
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        let base = serve_once(head, body.clone());
        let dir = tempfile::tempdir().unwrap();
        let fetcher = ArchiveFetcher::new(dir.path().to_path_buf());

        let last = Mutex::new(None);
        let path = fetcher
            .download(&version(&format!("{}/OptiScaler_0.7.9.zip", base)), |p| {
                *last.lock().unwrap() = Some(p)
            })
            .unwrap();

        assert_eq!(fs::read(&path).unwrap(), body);
        assert!(path.starts_with(dir.path()));
        assert_eq!(path.extension().unwrap(), "zip");
        assert_eq!(*last.lock().unwrap(), Some(DownloadProgress::Percent(100.0)));
    }

    #[test]
    fn test_download_rejects_text_response() {
        let body = b"<html>rate limited</html>".to_vec();
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        let base = serve_once(head, body);
        let dir = tempfile::tempdir().unwrap();
        let fetcher = ArchiveFetcher::new(dir.path().to_path_buf());

        let err = fetcher.download(&version(&format!("{}/a.zip", base)), |_| {}).unwrap_err();
        assert!(matches!(err, DownloadError::TextContent(_)));
        assert_eq!(leftover_files(dir.path()), 0);
    }

    #[test]
    fn test_download_rejects_error_status() {
        let head = "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string();
        let base = serve_once(head, Vec::new());
        let dir = tempfile::tempdir().unwrap();
        let fetcher = ArchiveFetcher::new(dir.path().to_path_buf());

        let err = fetcher.download(&version(&format!("{}/a.zip", base)), |_| {}).unwrap_err();
        assert!(matches!(err, DownloadError::HttpStatus(404)));
    }

    #[test]
    fn test_download_truncated_body_leaves_nothing_behind() {
        let head = "HTTP/1.1 200 OK\r\nContent-Type: application/zip\r\nContent-Length: 5000\r\nConnection: close\r\n\r\n".to_string();
        let base = serve_once(head, vec![1u8; 100]);
        let dir = tempfile::tempdir().unwrap();
        let fetcher = ArchiveFetcher::new(dir.path().to_path_buf());

        let err = fetcher.download(&version(&format!("{}/a.zip", base)), |_| {}).unwrap_err();
        assert!(matches!(err, DownloadError::Truncated { .. } | DownloadError::Io(_)));
        assert_eq!(leftover_files(dir.path()), 0);
    }

    #[test]
    fn test_download_without_url() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = ArchiveFetcher::new(dir.path().to_path_buf());
        assert!(matches!(fetcher.download(&version(""), |_| {}), Err(DownloadError::NoUrl)));
    }
}
