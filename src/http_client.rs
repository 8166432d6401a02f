//! Shared HTTP client configuration and bounded response helpers.

use std::io::{self, Read, Write};
use std::sync::OnceLock;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(60);
const WRITE_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("asl-classifier/", env!("CARGO_PKG_VERSION"));

/// Return a shared HTTP agent with consistent timeouts.
pub(crate) fn agent() -> &'static ureq::Agent {
    static AGENT: OnceLock<ureq::Agent> = OnceLock::new();
    AGENT.get_or_init(|| {
        ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(READ_TIMEOUT)
            .timeout_write(WRITE_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
    })
}

/// Stream a response to the provided writer, enforcing a maximum byte size.
/// Returns the number of bytes written.
pub(crate) fn copy_response_to_writer(
    response: ureq::Response,
    writer: &mut impl Write,
    max_bytes: u64,
) -> Result<u64, io::Error> {
    check_content_length(&response, max_bytes)?;
    let reader = response.into_reader();
    let mut limited = reader.take(max_bytes + 1);
    let mut total = 0u64;
    let mut buf = [0u8; 64 * 1024];
    loop {
        let read = limited.read(&mut buf)?;
        if read == 0 {
            break;
        }
        total += read as u64;
        if total > max_bytes {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Response exceeded {max_bytes} bytes"),
            ));
        }
        writer.write_all(&buf[..read])?;
    }
    Ok(total)
}

fn check_content_length(response: &ureq::Response, max_bytes: u64) -> Result<(), io::Error> {
    let Some(length) = response.header("Content-Length") else {
        return Ok(());
    };
    let Ok(length) = length.parse::<u64>() else {
        return Ok(());
    };
    if length > max_bytes {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Response too large: {length} bytes"),
        ));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    /// Serve one canned HTTP response on a loopback port and hand the raw
    /// request back through the join handle.
    pub(crate) fn serve_once(response: Vec<u8>) -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let mut request = String::new();
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 4096];
                let read = stream.read(&mut buf).unwrap_or(0);
                request = String::from_utf8_lossy(&buf[..read]).into_owned();
                let _ = stream.write_all(&response);
            }
            request
        });
        (format!("http://{addr}"), handle)
    }

    #[test]
    fn copy_rejects_content_length_over_max() {
        let (url, _) = serve_once(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\nok".to_vec());
        let response = agent().get(&url).call().unwrap();
        let mut sink = Vec::new();
        let err = copy_response_to_writer(response, &mut sink, 10).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn copy_rejects_body_over_max() {
        let body = "a".repeat(32);
        let (url, _) = serve_once(format!("HTTP/1.0 200 OK\r\n\r\n{body}").into_bytes());
        let response = agent().get(&url).call().unwrap();
        let mut sink = Vec::new();
        let err = copy_response_to_writer(response, &mut sink, 16).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn copy_streams_body_under_limit() {
        let body = "hello";
        let (url, handle) = serve_once(
            format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n{}",
                body.len(),
                body
            )
            .into_bytes(),
        );
        let response = agent().get(&url).call().unwrap();
        let mut sink = Vec::new();
        let written = copy_response_to_writer(response, &mut sink, 16).unwrap();
        assert_eq!(written, 5);
        assert_eq!(sink, body.as_bytes());
        assert!(handle.join().unwrap().contains("asl-classifier/"));
    }
}
