#[derive(Debug, snafu::Snafu)]
pub enum ClusterError {
    #[snafu(display("failed to bind the cluster gossip socket on {addr}: {source}"))]
    GossipBind {
        addr: std::net::SocketAddr,
        source: std::io::Error,
    },
    #[snafu(display("failed to bind the cluster forward listener on {addr}: {source}"))]
    ForwardBind {
        addr: std::net::SocketAddr,
        source: std::io::Error,
    },
    #[snafu(display("local write failed: {source}"))]
    Store { source: crate::store::StoreError },
}
