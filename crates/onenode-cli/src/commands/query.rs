use std::io::{self, Write};

use anyhow::Context;
use onenode_core::{Command, StreamEvent, StreamLine};
use onenode_stream::{CancelHandle, Pending, ResponseOutcome, StreamClient};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

pub async fn query(
    client: &StreamClient,
    token: Option<&str>,
    payload: &str,
    raw: bool,
) -> anyhow::Result<()> {
    let payload: serde_json::Value =
        serde_json::from_str(payload).context("query payload is not valid JSON")?;

    let (pending, cancel) = client.query_multi_agent(token, payload);

    let interrupt = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling query");
            interrupt.cancel();
        }
    });

    let result = run(pending, &cancel, raw, io::stdout()).await;
    watcher.abort();
    result
}

/// Await the query and print its stream until `end`, cancel, or a write error.
async fn run<W: Write>(
    pending: Pending,
    cancel: &CancelHandle,
    raw: bool,
    out: W,
) -> anyhow::Result<()> {
    let mut live = match pending.await.context("query failed")? {
        ResponseOutcome::Live(live) => live,
        ResponseOutcome::Signal(status) => {
            info!(%status, "agent returned no content");
            return Ok(());
        }
    };

    let mut printer = Printer::new(out, raw);
    let stop = Notify::new();
    let decoded = tokio::select! {
        result = live.decode_lines(|line| {
            if !printer.line(line) {
                stop.notify_one();
            }
        }) => Some(result),
        _ = stop.notified() => {
            debug!("stream reading stopped early");
            None
        }
        _ = cancel.cancelled() => {
            info!("stream reading stopped");
            None
        }
    };

    printer.finish().context("failed to write output")?;
    if let Some(result) = decoded {
        result.context("stream interrupted")?;
    }
    Ok(())
}

/// Writes rendered stream lines, tracking whether more are wanted.
struct Printer<W> {
    out: W,
    raw: bool,
    ended: bool,
    error: Option<io::Error>,
}

impl<W: Write> Printer<W> {
    fn new(out: W, raw: bool) -> Self {
        Self {
            out,
            raw,
            ended: false,
            error: None,
        }
    }

    /// Print one line. Returns `false` once the run ended or output failed.
    fn line(&mut self, line: &str) -> bool {
        if self.is_done() {
            return false;
        }

        let parsed = StreamLine::parse(line);
        let text = if self.raw {
            Some(format!("{line}\n"))
        } else {
            render(&parsed)
        };
        if let Some(text) = text {
            self.write(text.as_bytes());
        }
        if matches!(&parsed, StreamLine::Event(event) if event.is_end()) {
            self.ended = true;
        }
        !self.is_done()
    }

    fn write(&mut self, bytes: &[u8]) {
        if let Err(e) = self.out.write_all(bytes).and_then(|()| self.out.flush()) {
            self.error = Some(e);
        }
    }

    fn is_done(&self) -> bool {
        self.ended || self.error.is_some()
    }

    /// Terminate the output, reporting the first write error.
    fn finish(mut self) -> io::Result<()> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        self.out.write_all(b"\n")?;
        self.out.flush()
    }
}

/// Text to print for one stream line, if any.
fn render(line: &StreamLine) -> Option<String> {
    match line {
        StreamLine::Event(event) => render_event(event),
        StreamLine::Raw(text) => Some(format!("{text}\n")),
    }
}

fn render_event(event: &StreamEvent) -> Option<String> {
    match &event.command {
        Command::Append => event.content().map(str::to_string),
        Command::NewStep => event.content().map(|step| format!("\n» {step}\n")),
        Command::End => event
            .content()
            .filter(|c| !c.is_empty())
            .map(|c| format!("\n{c}\n")),
        Command::Rewind | Command::AnchorStart | Command::Other(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use onenode_core::ClientConfig;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    const APPEND: &str = r#"{"channel": "prompt", "command": "append", "role": "", "data": {"content": "Hel"}, "thread": ""}"#;
    const END: &str = r#"{"channel": "control", "command": "end", "role": "", "data": {"content": ""}, "thread": ""}"#;

    fn printed(lines: &[&str], raw: bool) -> String {
        let mut printer = Printer::new(Vec::new(), raw);
        for line in lines {
            printer.line(line);
        }
        String::from_utf8(printer.out).unwrap()
    }

    /// Agent that streams `body` as one chunk and never ends the response.
    async fn agent_holding_open(body: String) -> StreamClient {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;

            let head = "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ntransfer-encoding: chunked\r\n\r\n";
            let chunk = format!("{:x}\r\n{body}\r\n", body.len());
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(chunk.as_bytes()).await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let config = ClientConfig {
            agent_base_url: format!("http://{addr}"),
            ..ClientConfig::default()
        };
        StreamClient::new(config).unwrap()
    }

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn raw_mode_echoes_lines() {
        assert_eq!(printed(&["plain", APPEND], true), format!("plain\n{APPEND}\n"));
    }

    #[test]
    fn append_prints_content() {
        assert_eq!(printed(&[APPEND, APPEND], false), "HelHel");
    }

    #[test]
    fn new_step_prints_marker() {
        let line = r#"{"channel": "progress", "command": "new_step", "data": {"type": "markdown", "content": "searching"}}"#;
        assert_eq!(printed(&[line], false), "\n» searching\n");
    }

    #[test]
    fn control_events_print_nothing() {
        let rewind = r#"{"channel": "prompt", "command": "rewind", "data": 1}"#;
        assert_eq!(printed(&[rewind, END], false), "");
    }

    #[test]
    fn raw_lines_pass_through() {
        assert_eq!(printed(&["plain"], false), "plain\n");
    }

    #[test]
    fn lines_after_end_are_ignored() {
        assert_eq!(printed(&[APPEND, END, APPEND], false), "Hel");
        assert_eq!(printed(&[END, "after"], true), format!("{END}\n"));

        let mut printer = Printer::new(Vec::new(), false);
        assert!(printer.line(APPEND));
        assert!(!printer.line(END));
        assert!(!printer.line(APPEND));
    }

    #[test]
    fn write_error_is_reported_once_finished() {
        let mut printer = Printer::new(ClosedPipe, false);
        assert!(!printer.line(APPEND));
        let err = printer.finish().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn run_stops_at_end_while_connection_stays_open() {
        let client = agent_holding_open(format!("{APPEND}\n{END}\n{APPEND}\n")).await;
        let (pending, cancel) = client.query_multi_agent(None, serde_json::json!({}));

        let mut out = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), run(pending, &cancel, false, &mut out))
            .await
            .expect("run should return after the end event")
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "Hel\n");
    }

    #[tokio::test]
    async fn run_stops_when_output_is_closed() {
        let client = agent_holding_open(format!("{APPEND}\n{APPEND}\n")).await;
        let (pending, cancel) = client.query_multi_agent(None, serde_json::json!({}));

        let err = tokio::time::timeout(Duration::from_secs(5), run(pending, &cancel, false, ClosedPipe))
            .await
            .expect("run should return after a write error")
            .unwrap_err();
        assert!(format!("{err:#}").contains("failed to write output"));
    }
}
