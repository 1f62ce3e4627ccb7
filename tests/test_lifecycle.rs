mod common;

use common::{MockEngine, core_with, recorder, recording_core};
use http_svr::config::Config;
use http_svr::http::connection::Stage;
use http_svr::http::request::Method;
use http_svr::http::response::Response;
use http_svr::server::{RequestHandler, ServerError, handler_fn};

const PING: &[u8] = b"GET /ping HTTP/1.1\r\nHost: x\r\n\r\n";

#[test]
fn test_single_chunk_request() {
    let (mut core, engine, seen) = recording_core();
    let session = engine.connect(&mut core, 1);

    engine.receive(&mut core, session, PING);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].url, "/ping");
    assert_eq!(seen[0].method, Some(Method::GET));
    assert_eq!(seen[0].headers.len(), 1);
    assert_eq!(seen[0].header("Host"), Some("x"));
    assert!(seen[0].body.is_empty());
}

#[test]
fn test_chunk_boundaries_do_not_matter() {
    let (mut reference_core, engine, reference) = recording_core();
    let session = engine.connect(&mut reference_core, 1);
    engine.receive(&mut reference_core, session, PING);
    let expected = reference.lock().unwrap()[0].clone();

    for first in 1..PING.len() - 1 {
        for second in first + 1..PING.len() {
            let (mut core, engine, seen) = recording_core();
            let session = engine.connect(&mut core, 1);

            engine.receive(&mut core, session, &PING[..first]);
            engine.receive(&mut core, session, &PING[first..second]);
            engine.receive(&mut core, session, &PING[second..]);

            let seen = seen.lock().unwrap();
            assert_eq!(seen.len(), 1, "split at {first}/{second}");
            assert_eq!(seen[0], expected, "split at {first}/{second}");
        }
    }
}

#[test]
fn test_pipelined_requests_keep_headers_apart() {
    let (mut core, engine, seen) = recording_core();
    let session = engine.connect(&mut core, 1);

    engine.receive(
        &mut core,
        session,
        b"GET /a HTTP/1.1\r\nX-One: 1\r\n\r\n\
          POST /b HTTP/1.1\r\nX-Two: 2\r\nContent-Length: 3\r\n\r\nabc",
    );

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);

    assert_eq!(seen[0].url, "/a");
    assert_eq!(seen[0].header("X-One"), Some("1"));
    assert_eq!(seen[0].header("X-Two"), None);

    assert_eq!(seen[1].url, "/b");
    assert_eq!(seen[1].method, Some(Method::POST));
    assert_eq!(seen[1].header("X-One"), None);
    assert_eq!(seen[1].header("X-Two"), Some("2"));
    assert_eq!(seen[1].body, b"abc".to_vec());
}

#[test]
fn test_repeated_header_keeps_last_value() {
    let (mut core, engine, seen) = recording_core();
    let session = engine.connect(&mut core, 1);

    engine.receive(
        &mut core,
        session,
        b"GET / HTTP/1.1\r\nAccept: a\r\nX-Empty:\r\nAccept: b\r\n\r\n",
    );

    let seen = seen.lock().unwrap();
    assert_eq!(seen[0].header("Accept"), Some("b"));
    assert_eq!(seen[0].header("X-Empty"), Some(""));
    assert_eq!(seen[0].headers.len(), 2);
}

#[test]
fn test_close_mid_head_discards_without_dispatch() {
    let (mut core, engine, seen) = recording_core();
    let session = engine.connect(&mut core, 1);

    engine.receive(&mut core, session, b"GET /partial HTTP/1.1\r\nHost: ");
    assert_eq!(core.state(session).unwrap().assembly.stage(), Stage::InMessage);

    engine.disconnect(&mut core, session);

    assert!(seen.lock().unwrap().is_empty());
    assert!(core.state(session).is_none());
    assert_eq!(core.pool().in_use(), 0);
}

#[test]
fn test_free_hook_reports_partial_body() {
    let (mut core, engine, seen) = recording_core();
    let session = engine.connect(&mut core, 1);

    engine.receive(
        &mut core,
        session,
        b"POST /upload HTTP/1.1\r\nContent-Length: 10\r\n\r\nhello",
    );
    let state = core.state(session).unwrap();
    assert_eq!(state.assembly.stage(), Stage::InBody);
    assert_eq!(state.assembly.request().unwrap().body, b"hello".to_vec());

    let discarded = core.on_private_data_free(session).unwrap();
    assert!(discarded.request);
    assert!(!discarded.field);
    assert!(!discarded.value);
    assert!(seen.lock().unwrap().is_empty());

    // A second release finds nothing.
    assert!(core.on_private_data_free(session).is_none());
    assert_eq!(core.pool().in_use(), 0);
}

#[test]
fn test_parse_error_closes_without_dispatch() {
    let (mut core, engine, seen) = recording_core();
    let session = engine.connect(&mut core, 1);

    let result = core.on_bytes_received(session, b"GET / HTTP/1.1\r\nBroken Header\r\n\r\n");

    match result {
        Err(ServerError::Parse { session: s, name, .. }) => {
            assert_eq!(s, session);
            assert_eq!(name, "HPE_INVALID_HEADER_TOKEN");
        }
        other => panic!("expected parse error, got {other:?}"),
    }
    assert_eq!(engine.close_requests(), vec![session]);
    assert!(seen.lock().unwrap().is_empty());

    // Bytes still in flight after the close request are ignored.
    assert!(core.on_bytes_received(session, PING).is_ok());
    assert!(seen.lock().unwrap().is_empty());

    engine.confirm_closes(&mut core);
    assert!(core.is_empty());
}

#[test]
fn test_parse_error_after_complete_message() {
    let (mut core, engine, seen) = recording_core();
    let session = engine.connect(&mut core, 1);

    let mut data = PING.to_vec();
    data.extend_from_slice(b"BREW /pot HTTP/1.1\r\n\r\n");
    engine.receive(&mut core, session, &data);

    assert_eq!(seen.lock().unwrap().len(), 1);
    assert_eq!(engine.close_requests(), vec![session]);
}

#[test]
fn test_body_over_limit_closes_connection() {
    let config = Config::from_yaml_str("limits:\n  max_body_bytes: 4\n").unwrap();
    let (handler, seen) = recorder();
    let (mut core, engine) = core_with(&config, handler);
    let session = engine.connect(&mut core, 1);

    let result = core.on_bytes_received(
        session,
        b"POST / HTTP/1.1\r\nContent-Length: 8\r\n\r\n12345678",
    );

    assert!(matches!(result, Err(ServerError::Parse { name: "HPE_CB_ERROR", .. })));
    assert_eq!(engine.close_requests(), vec![session]);
    assert!(seen.lock().unwrap().is_empty());
}

#[test]
fn test_handler_error_keeps_connection_open() {
    let handler = handler_fn(|_session, request| {
        if request.path() == "/fail" {
            anyhow::bail!("refused {}", request.url);
        }
        Ok(())
    });
    let (mut core, engine) = core_with(&Config::default(), handler);
    let session = engine.connect(&mut core, 1);

    let result = core.on_bytes_received(session, b"GET /fail HTTP/1.1\r\n\r\n");
    match result {
        Err(ServerError::Handler(err)) => assert_eq!(err.to_string(), "refused /fail"),
        other => panic!("expected handler error, got {other:?}"),
    }
    assert!(engine.close_requests().is_empty());

    assert!(core.on_bytes_received(session, PING).is_ok());
}

#[test]
fn test_handler_replies_through_session() {
    let handler = handler_fn(|session, request| {
        session.send_response(&Response::ok(request.url.clone()))?;
        Ok(())
    });
    let (mut core, engine) = core_with(&Config::default(), handler);
    let session = engine.connect(&mut core, 1);

    engine.receive(&mut core, session, PING);

    let sent = String::from_utf8(engine.sent_to(session)).unwrap();
    assert!(sent.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(sent.contains("Content-Length: 5\r\n"));
    assert!(sent.ends_with("\r\n\r\n/ping"));
}

#[test]
fn test_pool_exhaustion_rejects_only_the_new_connection() {
    let config = Config::from_yaml_str("server:\n  max_connections: 1\n").unwrap();
    let (handler, seen) = recorder();
    let (mut core, engine) = core_with(&config, handler);

    let first = engine.connect(&mut core, 1);
    let second = engine.connect(&mut core, 2);

    assert_eq!(engine.close_requests(), vec![second]);
    assert_eq!(core.len(), 1);

    // The rejected session's close confirmation releases nothing.
    engine.confirm_closes(&mut core);
    assert_eq!(core.len(), 1);

    engine.receive(&mut core, first, PING);
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[test]
fn test_direct_pool_exhaustion_error() {
    let config = Config::from_yaml_str("server:\n  max_connections: 1\n").unwrap();
    let (handler, _seen) = recorder();
    let (mut core, _engine) = core_with(&config, handler);

    core.on_new_connection(http_svr::server::SessionId::new(1), MockEngine::peer(1))
        .unwrap();
    let err = core
        .on_new_connection(http_svr::server::SessionId::new(2), MockEngine::peer(2))
        .unwrap_err();
    assert!(matches!(err, ServerError::PoolExhausted(_)));
}

#[test]
fn test_slots_are_reused_after_close() {
    let config = Config::from_yaml_str("server:\n  max_connections: 1\n").unwrap();
    let (handler, seen) = recorder();
    let (mut core, engine) = core_with(&config, handler);

    for id in 1..=3 {
        let session = engine.connect(&mut core, id);
        engine.receive(&mut core, session, b"GET /half HTTP/1.1\r\n");
        engine.disconnect(&mut core, session);
    }

    let session = engine.connect(&mut core, 4);
    assert_eq!(core.state(session).unwrap().assembly.stage(), Stage::Idle);
    engine.receive(&mut core, session, PING);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].url, "/ping");
    assert_eq!(core.pool().in_use(), 1);
}

#[test]
fn test_close_all_releases_every_slot() {
    let (mut core, engine, _seen) = recording_core();
    for id in 1..=3 {
        let session = engine.connect(&mut core, id);
        engine.receive(&mut core, session, b"GET / HTTP/1.1\r\n");
    }

    assert_eq!(core.close_all(), 3);
    assert!(core.is_empty());
    assert_eq!(core.pool().in_use(), 0);
    assert_eq!(engine.close_requests().len(), 3);
}

#[test]
fn test_close_all_reaches_sessions_not_yet_announced() {
    let (mut core, engine, _seen) = recording_core();
    let known = engine.connect(&mut core, 1);
    let queued = engine.accept_unannounced(2);

    assert_eq!(core.close_all(), 2);
    assert_eq!(engine.close_requests(), vec![known, queued]);
    assert!(core.is_empty());
}

#[test]
fn test_handler_panic_closes_only_that_connection() {
    let (mut record, seen) = recorder();
    let handler = handler_fn(move |session, request| {
        if request.path() == "/boom" {
            panic!("handler blew up");
        }
        record.on_request(session, request)
    });
    let (mut core, engine) = core_with(&Config::default(), handler);
    let doomed = engine.connect(&mut core, 1);
    let healthy = engine.connect(&mut core, 2);

    let mut data = b"GET /boom HTTP/1.1\r\n\r\n".to_vec();
    data.extend_from_slice(PING);
    let result = core.on_bytes_received(doomed, &data);

    match result {
        Err(ServerError::Handler(err)) => {
            assert_eq!(err.to_string(), "panicked: handler blew up");
        }
        other => panic!("expected handler error, got {other:?}"),
    }
    assert_eq!(engine.close_requests(), vec![doomed]);
    // The pipelined request behind the panic is dropped with the connection.
    assert!(seen.lock().unwrap().is_empty());

    engine.receive(&mut core, healthy, PING);
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[test]
fn test_bytes_for_unknown_session_are_ignored() {
    let (mut core, _engine, seen) = recording_core();

    assert!(core
        .on_bytes_received(http_svr::server::SessionId::new(99), PING)
        .is_ok());
    assert!(seen.lock().unwrap().is_empty());
}
