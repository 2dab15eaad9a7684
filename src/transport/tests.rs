//! Transport Module Tests
//!
//! ## Test Scopes
//! - **Inbound Queue**: injection and processing budgets, cancellation, dropped replies.
//! - **HTTP**: full axum + reqwest exchanges on a loopback socket, including error statuses.
//! - **Memory**: delivery, unknown peers and partitions.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    use crate::codec::{BincodeCodec, Codec, JsonCodec};
    use crate::error::{InboundError, TransportError};
    use crate::membership::{HttpPeer, Peer, PeerState, UpdateEvent, UpdateType};
    use crate::metrics::{MetricsSink, NoopMetrics, ProbeKind, ProbeStatus};
    use crate::transport::inbound::{self, InboundReceiver, InboundSettings, ReplyFailure};
    use crate::transport::protocol::{Request, RequestKind, Response};
    use crate::transport::{HttpTransport, MemoryNetwork, Transport};

    #[derive(Default)]
    struct CountingMetrics {
        inject_timeouts: AtomicUsize,
        process_timeouts: AtomicUsize,
    }

    impl MetricsSink for CountingMetrics {
        fn inject_timeout(&self, _kind: RequestKind) {
            self.inject_timeouts.fetch_add(1, Ordering::SeqCst);
        }
        fn process_timeout(&self, _kind: RequestKind) {
            self.process_timeouts.fetch_add(1, Ordering::SeqCst);
        }
        fn probe(&self, _kind: ProbeKind, _status: ProbeStatus, _elapsed: Duration) {}
        fn transition(&self, _to: PeerState) {}
        fn gossip_sent(&self, _count: usize) {}
    }

    fn peer(id: &str, port: u16) -> Peer {
        Peer::Http(HttpPeer::new(id, "127.0.0.1", port))
    }

    fn ping() -> Request {
        Request::DirectPing { updates: vec![] }
    }

    fn small_settings() -> InboundSettings {
        InboundSettings {
            buffer_size: 1,
            inject_timeout: Duration::from_millis(100),
            process_timeout: Duration::from_millis(500),
        }
    }

    /// Answers every request with `updates`, or with a failure for indirect pings.
    fn spawn_responder(mut incoming: InboundReceiver, updates: Vec<UpdateEvent>) {
        tokio::spawn(async move {
            while let Some(req) = incoming.recv().await {
                let reply = match req.request {
                    Request::DirectPing { .. } => Ok(Response {
                        updates: updates.clone(),
                    }),
                    Request::IndirectPing { .. } => Err(ReplyFailure::TargetUnreachable),
                };
                let _ = req.reply.send(reply);
            }
        });
    }

    // ============================================================
    // INBOUND QUEUE TESTS
    // ============================================================

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_times_out_injection() {
        // ARRANGE: nobody drains the queue
        let metrics = Arc::new(CountingMetrics::default());
        let (sender, _incoming) =
            inbound::channel(small_settings(), metrics.clone(), CancellationToken::new());

        let first = {
            let sender = sender.clone();
            tokio::spawn(async move { sender.submit(ping()).await })
        };
        tokio::task::yield_now().await;

        // ACT
        let second = sender.submit(ping()).await;

        // ASSERT
        assert_eq!(second, Err(InboundError::InjectTimeout));
        assert_eq!(metrics.inject_timeouts.load(Ordering::SeqCst), 1);

        // The first one got in but was never answered
        assert_eq!(first.await.unwrap(), Err(InboundError::ProcessTimeout));
        assert_eq!(metrics.process_timeouts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_request_times_out_processing() {
        let metrics = Arc::new(CountingMetrics::default());
        let (sender, mut incoming) =
            inbound::channel(small_settings(), metrics.clone(), CancellationToken::new());

        // Hold on to the request without replying
        let holder = tokio::spawn(async move { incoming.recv().await });

        let result = sender.submit(ping()).await;

        assert_eq!(result, Err(InboundError::ProcessTimeout));
        assert_eq!(metrics.inject_timeouts.load(Ordering::SeqCst), 0);
        assert_eq!(metrics.process_timeouts.load(Ordering::SeqCst), 1);
        drop(holder);
    }

    #[tokio::test]
    async fn test_dropped_reply_is_reported() {
        let (sender, mut incoming) =
            inbound::channel(small_settings(), Arc::new(NoopMetrics), CancellationToken::new());

        tokio::spawn(async move {
            while let Some(req) = incoming.recv().await {
                drop(req);
            }
        });

        assert_eq!(sender.submit(ping()).await, Err(InboundError::Dropped));
    }

    #[tokio::test]
    async fn test_cancellation_releases_waiting_caller() {
        let cancel = CancellationToken::new();
        let settings = InboundSettings {
            buffer_size: 1,
            inject_timeout: Duration::from_secs(3600),
            process_timeout: Duration::from_secs(3600),
        };
        let (sender, _incoming) = inbound::channel(settings, Arc::new(NoopMetrics), cancel.clone());

        let waiting = tokio::spawn(async move { sender.submit(ping()).await });
        tokio::task::yield_now().await;

        cancel.cancel();

        assert_eq!(waiting.await.unwrap(), Err(InboundError::Cancelled));
    }

    #[tokio::test]
    async fn test_answer_is_passed_through() {
        let (sender, incoming) =
            inbound::channel(small_settings(), Arc::new(NoopMetrics), CancellationToken::new());
        let update = UpdateEvent::new(peer("c", 9002), UpdateType::Suspect, 0, 5);
        spawn_responder(incoming, vec![update.clone()]);

        let reply = sender.submit(ping()).await.unwrap();

        assert_eq!(reply, Ok(Response { updates: vec![update] }));
    }

    // ============================================================
    // HTTP TRANSPORT TESTS
    // ============================================================

    fn http_transport(codec: Arc<dyn Codec>, cancel: CancellationToken) -> HttpTransport {
        let (sender, incoming) =
            inbound::channel(InboundSettings::default(), Arc::new(NoopMetrics), cancel);
        HttpTransport::new(codec, sender, incoming)
    }

    async fn serve(transport: &HttpTransport) -> u16 {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let app = transport.router();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        port
    }

    #[tokio::test]
    async fn test_http_direct_ping_round_trip() {
        let codecs: [Arc<dyn Codec>; 2] = [Arc::new(JsonCodec), Arc::new(BincodeCodec)];

        for codec in codecs {
            // ARRANGE
            let server = http_transport(codec.clone(), CancellationToken::new());
            let port = serve(&server).await;
            let gossip = vec![UpdateEvent::new(peer("c", 9002), UpdateType::Suspect, 0, 5)];
            spawn_responder(server.incoming_requests().unwrap(), gossip.clone());

            let client = http_transport(codec, CancellationToken::new());

            // ACT
            let response = client
                .rpc(&peer("srv", port), ping(), Duration::from_secs(2))
                .await
                .unwrap();

            // ASSERT
            assert_eq!(response.updates, gossip);
        }
    }

    #[tokio::test]
    async fn test_http_indirect_failure_maps_to_target_unreachable() {
        let server = http_transport(Arc::new(JsonCodec), CancellationToken::new());
        let port = serve(&server).await;
        spawn_responder(server.incoming_requests().unwrap(), vec![]);
        let client = http_transport(Arc::new(JsonCodec), CancellationToken::new());

        let request = Request::IndirectPing {
            updates: vec![],
            target_peer: peer("b", 9001),
        };
        let result = client
            .rpc(&peer("srv", port), request, Duration::from_secs(2))
            .await;

        assert!(matches!(result, Err(TransportError::TargetUnreachable)));
    }

    #[tokio::test]
    async fn test_http_shutting_down_server_answers_503() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let server = http_transport(Arc::new(JsonCodec), cancel);
        let port = serve(&server).await;
        let client = http_transport(Arc::new(JsonCodec), CancellationToken::new());

        let result = client
            .rpc(&peer("srv", port), ping(), Duration::from_secs(2))
            .await;

        match result {
            Err(TransportError::Remote { status, .. }) => assert_eq!(status, 503),
            other => panic!("Expected 503, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_http_undecodable_body_answers_400() {
        let server = http_transport(Arc::new(JsonCodec), CancellationToken::new());
        let port = serve(&server).await;

        let response = reqwest::Client::new()
            .post(format!("http://127.0.0.1:{}/v1/ping/direct", port))
            .body("definitely not json")
            .send()
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 400);
    }

    #[tokio::test]
    async fn test_http_wrong_endpoint_answers_400() {
        let server = http_transport(Arc::new(JsonCodec), CancellationToken::new());
        let port = serve(&server).await;
        let body = JsonCodec.encode_request(&ping()).unwrap();

        let response = reqwest::Client::new()
            .post(format!("http://127.0.0.1:{}/v1/ping/indirect", port))
            .body(body)
            .send()
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 400);
    }

    #[tokio::test]
    async fn test_http_unreachable_peer_is_connection_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = http_transport(Arc::new(JsonCodec), CancellationToken::new());
        let result = client
            .rpc(&peer("gone", port), ping(), Duration::from_secs(2))
            .await;

        assert!(matches!(result, Err(TransportError::Connection(_))));
    }

    #[tokio::test]
    async fn test_incoming_requests_handed_out_once() {
        let transport = http_transport(Arc::new(JsonCodec), CancellationToken::new());

        assert!(transport.incoming_requests().is_some());
        assert!(transport.incoming_requests().is_none());
    }

    // ============================================================
    // MEMORY TRANSPORT TESTS
    // ============================================================

    #[tokio::test(start_paused = true)]
    async fn test_memory_delivers_and_answers() {
        let network = MemoryNetwork::new();
        let a = peer("a", 1);
        let b = peer("b", 2);
        let metrics = Arc::new(NoopMetrics);
        let cancel = CancellationToken::new();

        let node_a = network.join(a, InboundSettings::default(), metrics.clone(), cancel.clone());
        let node_b = network.join(b.clone(), InboundSettings::default(), metrics, cancel);
        let gossip = vec![UpdateEvent::new(peer("c", 3), UpdateType::Dead, 1, 9)];
        spawn_responder(node_b.incoming_requests().unwrap(), gossip.clone());

        let response = node_a.rpc(&b, ping(), Duration::from_secs(1)).await.unwrap();

        assert_eq!(response.updates, gossip);
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_unknown_peer() {
        let network = MemoryNetwork::new();
        let node_a = network.join(
            peer("a", 1),
            InboundSettings::default(),
            Arc::new(NoopMetrics),
            CancellationToken::new(),
        );

        let result = node_a.rpc(&peer("ghost", 9), ping(), Duration::from_secs(1)).await;

        assert!(matches!(result, Err(TransportError::UnknownPeer(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_partition_times_out_until_healed() {
        let network = MemoryNetwork::new();
        let a = peer("a", 1);
        let b = peer("b", 2);
        let metrics = Arc::new(NoopMetrics);
        let cancel = CancellationToken::new();

        let node_a = network.join(a, InboundSettings::default(), metrics.clone(), cancel.clone());
        let node_b = network.join(b.clone(), InboundSettings::default(), metrics, cancel);
        spawn_responder(node_b.incoming_requests().unwrap(), vec![]);

        network.partition(&b);
        let started = tokio::time::Instant::now();
        let result = node_a.rpc(&b, ping(), Duration::from_secs(1)).await;

        assert!(matches!(result, Err(TransportError::Timeout(_))));
        assert!(started.elapsed() >= Duration::from_secs(1));

        network.heal(&b);
        assert!(node_a.rpc(&b, ping(), Duration::from_secs(1)).await.is_ok());
    }
}
