//! Internal stress tests for completion correlation.
//!
//! Many tasks submit at once while completions arrive from plain OS threads
//! in an order unrelated to submission.

use std::time::Duration;

use futures::future::join_all;

use crate::core::builder::ClientBuilder;
use crate::core::command;
use crate::proto::error::RequestErrorType;
use crate::proto::frame::Frame;
use crate::testing::MockEngine;

fn echo_first_arg(engine: &MockEngine) {
    engine.respond_from_threads(|s| {
        let arg = s.commands[0].args().first().cloned();
        Some(Ok(Frame::BulkString(arg)))
    });
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_stress() {
    let engine = MockEngine::new();
    echo_first_arg(&engine);
    let client = ClientBuilder::new()
        .address("localhost")
        .max_inflight_requests(10_000)
        .connect(&engine)
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..1000 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            let key = format!("key-{i}");
            let value = client.get(key.clone()).await.unwrap();
            assert_eq!(value.as_deref(), Some(key.as_bytes()));
        }));
    }

    for handle in join_all(handles).await {
        handle.unwrap();
    }
    assert_eq!(client.pending_requests(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_completions_in_reverse_order() {
    let engine = MockEngine::new();
    let client = ClientBuilder::new()
        .address("localhost")
        .max_inflight_requests(0)
        .connect(&engine)
        .unwrap();

    let requests: Vec<_> = (0..500)
        .map(|i| {
            let client = client.clone();
            tokio::spawn(async move { client.incr_by("n", i).await })
        })
        .collect();

    engine.wait_for_submissions(500).await;
    let completer = {
        let engine = engine.clone();
        std::thread::spawn(move || {
            for submission in engine.submissions().into_iter().rev() {
                let amount: i64 = std::str::from_utf8(&submission.commands[0].args()[1])
                    .unwrap()
                    .parse()
                    .unwrap();
                engine.complete(submission.token, &Frame::Integer(amount));
            }
        })
    };
    completer.join().unwrap();

    for (i, request) in requests.into_iter().enumerate() {
        assert_eq!(request.await.unwrap().unwrap(), i as i64);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_close_under_load() {
    let engine = MockEngine::new();
    let client = ClientBuilder::new()
        .address("localhost")
        .max_inflight_requests(0)
        .connect(&engine)
        .unwrap();

    let requests: Vec<_> = (0..300)
        .map(|_| {
            let client = client.clone();
            tokio::spawn(async move { client.ping().await })
        })
        .collect();
    engine.wait_for_submissions(300).await;

    // Half the requests race a completion against close.
    let racer = {
        let engine = engine.clone();
        std::thread::spawn(move || {
            for submission in engine.submissions().into_iter().step_by(2) {
                engine.fail(submission.token, "lost", RequestErrorType::Disconnect);
            }
        })
    };
    client.close();
    racer.join().unwrap();

    for request in requests {
        let err = request.await.unwrap().unwrap_err();
        assert!(err.is_closing() || matches!(err, crate::Error::Connection { .. }));
    }
    assert_eq!(client.pending_requests(), 0);
    assert_eq!(engine.close_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_requests_do_not_leak() {
    let engine = MockEngine::new();
    let client = ClientBuilder::new()
        .address("localhost")
        .max_inflight_requests(10)
        .connect(&engine)
        .unwrap();

    // Far more timed-out requests than the in-flight limit.
    for _ in 0..100 {
        let err = client
            .send_command_timeout(&command::ping(), Duration::from_millis(5))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::Error::Timeout { .. }));
    }
    assert_eq!(client.pending_requests(), 0);

    for submission in engine.submissions() {
        engine.complete(submission.token, &Frame::Null);
    }
    assert_eq!(client.pending_requests(), 0);
}
