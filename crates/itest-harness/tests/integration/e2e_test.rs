use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Notify;

use itest_proto::auctioneer::channel_auctioneer_client::ChannelAuctioneerClient;
use itest_proto::auctioneer::channel_auctioneer_server::ChannelAuctioneer;
use itest_proto::auctioneer::{ReserveAccountRequest, TermsRequest, TermsResponse};
use itest_proto::swapserver::LoopOutTermsRequest;
use itest_proto::swapserver::swap_server_client::SwapServerClient;
use tonic::{Code, Request, Response, Status};

use itest_harness::client::connect;
use itest_harness::{HarnessError, MockSwapServer, ServerHarness};

use crate::helpers::test_config;

#[tokio::test]
async fn should_answer_unimplemented_over_tls_then_refuse_after_stop() -> anyhow::Result<()> {
    let mut harness = ServerHarness::new(test_config());
    harness.start().await?;
    let addr = harness.local_addr().unwrap();

    let channel = connect(addr, harness.cert_file().unwrap()).await?;
    let mut client = ChannelAuctioneerClient::new(channel);
    let status = client.terms(TermsRequest {}).await.unwrap_err();
    assert_eq!(status.code(), Code::Unimplemented, "got {status:?}");

    let status = client
        .reserve_account(ReserveAccountRequest {
            account_value: 100_000,
            account_expiry: 2016,
            trader_key: vec![2; 33],
        })
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Unimplemented, "got {status:?}");
    drop(client);

    harness.stop().await?;

    let err = tokio::net::TcpStream::connect(addr).await.unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::ConnectionRefused);
    Ok(())
}

#[tokio::test]
async fn should_reject_client_trusting_another_cert() -> anyhow::Result<()> {
    let mut served = ServerHarness::new(test_config());
    let mut other = ServerHarness::new(test_config());
    served.start().await?;
    other.start().await?;

    let result = connect(served.local_addr().unwrap(), other.cert_file().unwrap()).await;
    assert!(
        matches!(result, Err(HarnessError::Transport(_))),
        "handshake against a foreign cert should fail"
    );

    served.stop().await?;
    other.stop().await?;
    Ok(())
}

#[tokio::test]
async fn should_not_serve_swap_server_by_default() -> anyhow::Result<()> {
    let mut harness = ServerHarness::new(test_config());
    harness.start().await?;

    let mut client = SwapServerClient::new(harness.channel().await?);
    let status = client
        .loop_out_terms(LoopOutTermsRequest {})
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Unimplemented, "got {status:?}");
    drop(client);

    harness.stop().await?;
    Ok(())
}

#[tokio::test]
async fn should_serve_registered_swap_server() -> anyhow::Result<()> {
    let mut harness = ServerHarness::new(test_config()).with_swap_server(MockSwapServer);
    harness.start().await?;

    let channel = harness.channel().await?;
    let status = SwapServerClient::new(channel.clone())
        .loop_out_terms(LoopOutTermsRequest {})
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Unimplemented);
    let status = ChannelAuctioneerClient::new(channel)
        .terms(TermsRequest {})
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Unimplemented);

    harness.stop().await?;
    Ok(())
}

struct FixedTerms;

#[tonic::async_trait]
impl ChannelAuctioneer for FixedTerms {
    async fn terms(
        &self,
        _request: Request<TermsRequest>,
    ) -> Result<Response<TermsResponse>, Status> {
        Ok(Response::new(TermsResponse {
            max_account_value: 10_000_000,
            max_order_duration_blocks: 2016,
            next_batch_clear_timestamp: 0,
        }))
    }
}

#[tokio::test]
async fn should_serve_overridden_methods_and_stub_the_rest() -> anyhow::Result<()> {
    let mut harness = ServerHarness::with_service(test_config(), FixedTerms);
    harness.start().await?;

    let mut client = ChannelAuctioneerClient::new(harness.channel().await?);
    let terms = client.terms(TermsRequest {}).await?.into_inner();
    assert_eq!(terms.max_account_value, 10_000_000);
    assert_eq!(terms.max_order_duration_blocks, 2016);

    let status = client
        .reserve_account(ReserveAccountRequest::default())
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Unimplemented);
    drop(client);

    harness.stop().await?;
    Ok(())
}

#[tokio::test]
async fn should_refuse_channel_when_not_running() {
    let harness = ServerHarness::new(test_config());
    assert!(matches!(
        harness.channel().await,
        Err(HarnessError::NotRunning)
    ));
}

/// Counts handlers currently executing; decremented on drop, including cancellation.
struct LiveGuard(Arc<AtomicUsize>);

impl LiveGuard {
    fn enter(live: &Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(live))
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct SlowTerms {
    live: Arc<AtomicUsize>,
    entered: Notify,
}

#[tonic::async_trait]
impl ChannelAuctioneer for SlowTerms {
    async fn terms(
        &self,
        _request: Request<TermsRequest>,
    ) -> Result<Response<TermsResponse>, Status> {
        let _guard = LiveGuard::enter(&self.live);
        self.entered.notify_one();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        Ok(Response::new(TermsResponse::default()))
    }
}

#[tokio::test]
async fn should_drain_in_flight_call_before_stop_returns() -> anyhow::Result<()> {
    let mut harness = ServerHarness::with_service(test_config(), SlowTerms::default());
    harness.start().await?;
    let mut serve_signal = harness.take_serve_signal().unwrap();
    let service = Arc::clone(harness.service());

    let mut client = ChannelAuctioneerClient::new(harness.channel().await?);
    let call = tokio::spawn(async move { client.terms(TermsRequest {}).await });
    service.entered.notified().await;
    assert_eq!(service.live.load(Ordering::SeqCst), 1);

    harness.stop().await?;

    assert_eq!(
        service.live.load(Ordering::SeqCst),
        0,
        "a handler is still running after stop returned"
    );
    let outcome = serve_signal.try_recv().expect("serve outcome written before stop returned");
    assert!(outcome.is_ok(), "drained shutdown should be Ok, got {outcome:?}");

    // The drained call completed rather than being cut off.
    call.await??;
    Ok(())
}
