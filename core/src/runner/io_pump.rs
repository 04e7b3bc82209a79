use std::time::Instant;

use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

use super::log::LogStream;
use crate::error::SupervisorError;

#[derive(Debug)]
pub enum LineTap {
    Line {
        stream: LogStream,
        text: String,
        at: Instant,
    },
    /// `dropped` lines from `stream` were discarded because the channel was full.
    Overflow { stream: LogStream, dropped: u64 },
}

/// Reads `rd` to EOF and forwards complete lines.
///
/// Never waits on the channel while the child is producing: a full channel
/// drops the line and the next successful send is preceded by an overflow tap.
/// A line longer than `max_line` bytes is forwarded in pieces, split on a
/// character boundary.
pub fn pump<R>(
    mut rd: R,
    stream: LogStream,
    line_tx: mpsc::Sender<LineTap>,
    max_line: usize,
) -> JoinHandle<Result<u64, SupervisorError>>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let label = stream.as_str();
        // Room for the longest UTF-8 sequence, so a split always makes progress.
        let max_line = max_line.max(4);
        let mut buf = vec![0u8; 16 * 1024];
        let mut total = 0u64;
        let mut line_buf: Vec<u8> = Vec::with_capacity((8 * 1024).min(max_line + 1));
        let mut dropped = 0u64;

        loop {
            let n = rd
                .read(&mut buf)
                .await
                .map_err(|e| SupervisorError::StreamIo {
                    stream: label,
                    source: e,
                })?;
            if n == 0 {
                break;
            }
            total += n as u64;

            line_buf.extend_from_slice(&buf[..n]);
            loop {
                let window = line_buf.len().min(max_line + 1);
                let one = match line_buf[..window].iter().position(|&b| b == b'\n') {
                    Some(pos) => {
                        let mut one = line_buf.drain(..=pos).collect::<Vec<u8>>();
                        trim_newline(&mut one);
                        one
                    }
                    None if line_buf.len() > max_line => {
                        let cut = char_boundary(&line_buf, max_line);
                        line_buf.drain(..cut).collect::<Vec<u8>>()
                    }
                    None => break,
                };
                let text = String::from_utf8_lossy(&one).to_string();
                offer(&line_tx, stream, text, &mut dropped);
            }
        }

        // EOF flush: deliver the last partial line if it doesn't end with '\n'.
        if !line_buf.is_empty() {
            trim_newline(&mut line_buf);
            if !line_buf.is_empty() {
                let text = String::from_utf8_lossy(&line_buf).to_string();
                offer(&line_tx, stream, text, &mut dropped);
            }
        }

        // The child is done writing here, so waiting for room is fine.
        if dropped > 0 {
            let _ = line_tx.send(LineTap::Overflow { stream, dropped }).await;
        }

        Ok(total)
    })
}

fn offer(tx: &mpsc::Sender<LineTap>, stream: LogStream, text: String, dropped: &mut u64) {
    if *dropped > 0 {
        match tx.try_send(LineTap::Overflow {
            stream,
            dropped: *dropped,
        }) {
            Ok(()) => *dropped = 0,
            Err(_) => {
                *dropped += 1;
                return;
            }
        }
    }
    match tx.try_send(LineTap::Line {
        stream,
        text,
        at: Instant::now(),
    }) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => *dropped += 1,
        Err(TrySendError::Closed(_)) => {}
    }
}

/// Largest cut at or below `max` that does not split a UTF-8 sequence.
/// `buf` is longer than `max`.
fn char_boundary(buf: &[u8], max: usize) -> usize {
    let mut cut = max;
    while cut > 0 && (buf[cut] & 0xC0) == 0x80 {
        cut -= 1;
    }
    if cut == 0 {
        max
    } else {
        cut
    }
}

fn trim_newline(buf: &mut Vec<u8>) {
    if buf.last() == Some(&b'\n') {
        buf.pop();
    }
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    fn text(tap: LineTap) -> String {
        match tap {
            LineTap::Line { text, .. } => text,
            other => panic!("expected a line, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn flushes_last_line_without_newline_on_eof() {
        let (mut wr, rd) = tokio::io::duplex(1024);
        let (tx, mut rx) = mpsc::channel::<LineTap>(8);

        let task = pump(rd, LogStream::Stdout, tx, 1024);

        wr.write_all(b"hello").await.unwrap();
        drop(wr);

        let tap = rx.recv().await.expect("expected one line");
        match tap {
            LineTap::Line { stream, text, .. } => {
                assert_eq!(text, "hello");
                assert_eq!(stream, LogStream::Stdout);
            }
            other => panic!("unexpected tap {other:?}"),
        }

        assert_eq!(task.await.unwrap().unwrap(), 5);
    }

    #[tokio::test]
    async fn crlf_and_split_writes_are_joined() {
        let (mut wr, rd) = tokio::io::duplex(1024);
        let (tx, mut rx) = mpsc::channel::<LineTap>(8);
        let task = pump(rd, LogStream::Stderr, tx, 1024);

        wr.write_all(b"par").await.unwrap();
        wr.write_all(b"tial\r\nnext\n").await.unwrap();
        drop(wr);

        assert_eq!(text(rx.recv().await.unwrap()), "partial");
        assert_eq!(text(rx.recv().await.unwrap()), "next");
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn full_channel_drops_with_marker() {
        let (mut wr, rd) = tokio::io::duplex(64 * 1024);
        let (tx, mut rx) = mpsc::channel::<LineTap>(2);

        let mut payload = String::new();
        for i in 0..10 {
            payload.push_str(&format!("line {i}\n"));
        }
        wr.write_all(payload.as_bytes()).await.unwrap();
        drop(wr);

        // Single-threaded runtime: the pump handles the whole chunk before the
        // receiver runs, so only two lines fit.
        let task = pump(rd, LogStream::Stdout, tx, 1024);

        assert_eq!(text(rx.recv().await.unwrap()), "line 0");
        assert_eq!(text(rx.recv().await.unwrap()), "line 1");
        match rx.recv().await.unwrap() {
            LineTap::Overflow { dropped, stream } => {
                assert_eq!(dropped, 8);
                assert_eq!(stream, LogStream::Stdout);
            }
            other => panic!("expected overflow marker, got {other:?}"),
        }
        assert!(rx.recv().await.is_none());
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn output_without_newline_is_split_at_the_line_limit() {
        let (mut wr, rd) = tokio::io::duplex(64 * 1024);
        let (tx, mut rx) = mpsc::channel::<LineTap>(16);
        let task = pump(rd, LogStream::Stdout, tx, 16);

        wr.write_all(&[b'a'; 40]).await.unwrap();
        wr.write_all(b"\nshort\n").await.unwrap();
        drop(wr);

        let mut got = Vec::new();
        while let Some(tap) = rx.recv().await {
            got.push(text(tap));
        }
        assert_eq!(
            got,
            vec!["a".repeat(16), "a".repeat(16), "a".repeat(8), "short".to_string()]
        );
        assert!(got.iter().all(|l| l.len() <= 16));
        assert_eq!(task.await.unwrap().unwrap(), 47);
    }

    #[tokio::test]
    async fn long_lines_split_on_character_boundaries() {
        let (mut wr, rd) = tokio::io::duplex(1024);
        let (tx, mut rx) = mpsc::channel::<LineTap>(8);
        let task = pump(rd, LogStream::Stderr, tx, 5);

        // Two-byte characters: a 5-byte cut would land inside the third one.
        wr.write_all("ééé\n".as_bytes()).await.unwrap();
        drop(wr);

        assert_eq!(text(rx.recv().await.unwrap()), "éé");
        assert_eq!(text(rx.recv().await.unwrap()), "é");
        assert!(rx.recv().await.is_none());
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn read_error_surfaces_after_forwarding_complete_lines() {
        let rd = tokio_test::io::Builder::new()
            .read(b"first\nsecond")
            .read_error(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed"))
            .build();
        let (tx, mut rx) = mpsc::channel::<LineTap>(8);

        let err = pump(rd, LogStream::Stderr, tx, 1024).await.unwrap().unwrap_err();
        assert!(matches!(err, SupervisorError::StreamIo { stream: "stderr", .. }));
        assert_eq!(text(rx.recv().await.unwrap()), "first");
        assert!(rx.recv().await.is_none());
    }
}
