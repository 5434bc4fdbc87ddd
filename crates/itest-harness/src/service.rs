//! Stateless stand-ins for the remote services.
//!
//! Every generated method already answers `Unimplemented` by default, so these
//! impls are empty. A test that needs real answers implements the same trait on
//! its own type and overrides only the methods it cares about.

use itest_proto::auctioneer::channel_auctioneer_server::ChannelAuctioneer;
use itest_proto::swapserver::swap_server_server::SwapServer;

/// Mock of the channel auctioneer, the contract the harness always serves.
#[derive(Debug, Default, Clone, Copy)]
pub struct MockAuctioneer;

#[tonic::async_trait]
impl ChannelAuctioneer for MockAuctioneer {}

/// Mock of the swap server, registered on demand via `ServerHarness::with_swap_server`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MockSwapServer;

#[tonic::async_trait]
impl SwapServer for MockSwapServer {}
