//! Protobuf contracts of the remote services mocked by the integration harness.

pub mod auctioneer {
    tonic::include_proto!("auctioneer");
}

pub mod swapserver {
    tonic::include_proto!("swapserver");
}
