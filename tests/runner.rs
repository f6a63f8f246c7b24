use indicatif::ProgressBar;
use mockito::Matcher;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use update_load_tester::*;

const OK_REPLY: &str = "<ns1:updateResponse><updateStatus>ok</updateStatus></ns1:updateResponse>";

fn corpus(len: usize) -> Corpus {
    Corpus::new(
        RequestTemplate::new("<soap:Envelope><soap:Body>", "</soap:Body></soap:Envelope>"),
        (0..len).map(|i| format!("<record id=\"{i}\"/>\n")).collect(),
    )
}

fn config(url: String, mode: Mode, threads: usize) -> Config {
    let mut config = Config::for_mode(mode);
    config.url = url;
    config.thread_count = threads;
    config.request_timeout = Duration::from_secs(5);
    config.success_marker = "<updateStatus>ok</updateStatus>".to_string();
    config
}

fn assert_consistent(summary: &RunSummary) {
    for w in &summary.workers {
        assert_eq!(w.ok + w.failed + w.timeouts + w.errors, w.total_calls, "{}", w.name);
    }
}

/// Accepts connections and never answers.
async fn silent_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((sock, _)) = listener.accept().await {
            held.push(sock);
        }
    });
    format!("http://{addr}/UpdateService")
}

/// Answers every request with something that is not HTTP.
async fn garbage_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut sock, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = sock.read(&mut buf).await;
                let _ = sock.write_all(b"GARBAGE\r\n\r\n").await;
                let _ = sock.shutdown().await;
            });
        }
    });
    format!("http://{addr}/UpdateService")
}

/// Sends the status line and headers, part of the body, then goes quiet.
async fn stalled_body_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut sock, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = sock.read(&mut buf).await;
                let _ = sock
                    .write_all(
                        b"HTTP/1.1 200 OK\r\n\
                          Content-Type: text/xml; charset=utf-8\r\n\
                          Content-Length: 1000\r\n\r\n\
                          <ns1:updateResponse>",
                    )
                    .await;
                let _ = sock.flush().await;
                std::future::pending::<()>().await;
                drop(sock);
            });
        }
    });
    format!("http://{addr}/UpdateService")
}

#[tokio::test]
async fn test_finite_all_ok_sends_one_call_per_worker() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/UpdateService")
        .match_header("content-type", "text/xml; charset=utf-8")
        .match_body(Matcher::Regex("^<soap:Envelope><soap:Body><record".to_string()))
        .with_body(OK_REPLY)
        .expect(32)
        .create_async()
        .await;

    let url = format!("{}/UpdateService", server.url());
    let runner = Runner::new(config(url, Mode::Finite, 32), corpus(64)).unwrap();
    assert_eq!(runner.calls_per_pass(), 32);

    let summary = runner
        .run(CancellationToken::new(), ProgressBar::hidden())
        .await;

    assert_eq!(summary.workers.len(), 32);
    assert_eq!(summary.ok(), 32);
    assert_eq!(summary.total_calls(), 32);
    for (rank, w) in summary.workers.iter().enumerate() {
        assert_eq!(w.name, format!("worker-{rank}"));
        assert_eq!(w.total_calls, 1);
        assert_eq!(w.ok, 1);
        assert_eq!(w.failed + w.timeouts + w.errors, 0);
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn test_rerun_against_ok_endpoint_is_idempotent() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/")
        .with_body(OK_REPLY)
        .create_async()
        .await;

    let runner = Runner::new(config(server.url(), Mode::Finite, 4), corpus(20)).unwrap();
    for _ in 0..2 {
        let summary = runner
            .run(CancellationToken::new(), ProgressBar::hidden())
            .await;
        for w in &summary.workers {
            assert_eq!(w.ok, 4);
            assert_eq!(w.failed + w.timeouts + w.errors, 0);
        }
    }
}

#[tokio::test]
async fn test_timeouts_are_counted_not_fatal() {
    let url = silent_endpoint().await;
    let mut config = config(url, Mode::Finite, 4);
    config.request_timeout = Duration::from_millis(200);
    let runner = Runner::new(config, corpus(12)).unwrap();

    let summary = runner
        .run(CancellationToken::new(), ProgressBar::hidden())
        .await;

    assert_eq!(summary.workers.len(), 4);
    assert_eq!(summary.timeouts(), 8);
    for w in &summary.workers {
        assert_eq!(w.ok, 0);
        assert_eq!(w.timeouts, 2);
        assert_eq!(w.total_calls, 2);
        assert!(w.average_secs >= 0.2);
    }
}

#[tokio::test]
async fn test_body_stalling_after_headers_is_timeout() {
    let url = stalled_body_endpoint().await;
    let mut config = config(url, Mode::Finite, 2);
    config.request_timeout = Duration::from_millis(200);
    let runner = Runner::new(config, corpus(4)).unwrap();

    let summary = runner
        .run(CancellationToken::new(), ProgressBar::hidden())
        .await;

    assert_eq!(summary.total_calls(), 2);
    assert_eq!(summary.timeouts(), 2);
    assert_eq!(summary.ok() + summary.failed() + summary.errors(), 0);
    assert_consistent(&summary);
}

#[tokio::test]
async fn test_malformed_response_is_transport_error() {
    let url = garbage_endpoint().await;
    let runner = Runner::new(config(url, Mode::Finite, 2), corpus(6)).unwrap();

    let summary = runner
        .run(CancellationToken::new(), ProgressBar::hidden())
        .await;

    assert_eq!(summary.errors(), 4);
    assert_eq!(summary.ok() + summary.failed() + summary.timeouts(), 0);
    assert_consistent(&summary);
}

#[tokio::test]
async fn test_alternating_replies_split_evenly() {
    let mut server = mockito::Server::new_async().await;
    // Even record ids succeed, odd ones get a failed status.
    server
        .mock("POST", "/")
        .match_body(Matcher::Regex(r#"id="\d*[02468]""#.to_string()))
        .with_body(OK_REPLY)
        .create_async()
        .await;
    server
        .mock("POST", "/")
        .match_body(Matcher::Regex(r#"id="\d*[13579]""#.to_string()))
        .with_status(500)
        .with_body("<updateStatus>failed</updateStatus>")
        .create_async()
        .await;

    let runner = Runner::new(config(server.url(), Mode::Finite, 4), corpus(44)).unwrap();
    let summary = runner
        .run(CancellationToken::new(), ProgressBar::hidden())
        .await;

    assert_consistent(&summary);
    for w in &summary.workers {
        assert_eq!(w.total_calls, 10);
        assert!(w.ok.abs_diff(w.failed) <= 1, "{w:?}");
        assert_eq!(w.timeouts + w.errors, 0);
    }
}

#[tokio::test]
async fn test_empty_corpus_completes() {
    let runner = Runner::new(
        config("http://127.0.0.1:9/".to_string(), Mode::Finite, 8),
        corpus(0),
    )
    .unwrap();
    let summary = runner
        .run(CancellationToken::new(), ProgressBar::hidden())
        .await;
    assert_eq!(summary.workers.len(), 8);
    assert_eq!(summary.total_calls(), 0);
}

#[tokio::test]
async fn test_infinite_mode_loops_until_cancelled() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/")
        .with_body(OK_REPLY)
        .create_async()
        .await;

    let mut config = config(server.url(), Mode::Infinite, 3);
    config.report_policy = ReportPolicy::Sampled { one_in: 2 };
    let runner = Runner::new(config, corpus(6)).unwrap();

    let cancel = CancellationToken::new();
    let stopper = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        stopper.cancel();
    });

    let summary = tokio::time::timeout(
        Duration::from_secs(10),
        runner.run(cancel, ProgressBar::hidden()),
    )
    .await
    .expect("workers did not stop after cancellation");

    assert_eq!(summary.workers.len(), 3);
    assert_consistent(&summary);
    for w in &summary.workers {
        assert!(w.loop_count >= 1);
        assert!(w.total_calls >= 2, "{w:?}");
        assert_eq!(w.ok, w.total_calls);
    }
}

#[test]
fn test_invalid_config_is_rejected() {
    let err = Runner::new(config("nope".to_string(), Mode::Finite, 1), corpus(1))
        .err()
        .unwrap();
    assert!(matches!(err, LoadError::InvalidConfig { .. }));
}
