use crate::replicator::storage::{GaggleNode, NodeIdType, TypeConfig};
use openraft::error::{InstallSnapshotError, NetworkError, RPCError, RaftError};
use openraft::network::{RPCOption, RaftNetwork, RaftNetworkFactory};
use openraft::raft::{
    AppendEntriesRequest, AppendEntriesResponse, InstallSnapshotRequest, InstallSnapshotResponse,
    VoteRequest, VoteResponse,
};
use std::time::Duration;

/// Builds HTTP clients for peer consensus traffic. Peers are reached on their
/// consensus address under `/raft/*`.
#[derive(Clone)]
pub struct GaggleNetworkFactory {
    client: reqwest::Client,
}

impl GaggleNetworkFactory {
    pub fn new(rpc_timeout: Duration) -> crate::error::Result<Self> {
        let client = reqwest::Client::builder().timeout(rpc_timeout).build()?;
        Ok(Self { client })
    }
}

pub struct GaggleNetwork {
    target: NodeIdType,
    target_addr: String,
    client: reqwest::Client,
}

impl GaggleNetwork {
    async fn send_rpc<Req, Resp, E>(
        &self,
        path: &str,
        req: &Req,
    ) -> Result<Resp, RPCError<NodeIdType, GaggleNode, RaftError<NodeIdType, E>>>
    where
        Req: serde::Serialize,
        Resp: serde::de::DeserializeOwned,
        E: std::error::Error,
    {
        let url = format!("http://{}/raft/{}", self.target_addr, path);

        let response = self
            .client
            .post(&url)
            .json(req)
            .send()
            .await
            .map_err(|e| RPCError::Network(NetworkError::new(&e)))?;

        if !response.status().is_success() {
            return Err(RPCError::Network(NetworkError::new(&std::io::Error::other(
                format!("peer {} answered {}", self.target, response.status()),
            ))));
        }

        response
            .json()
            .await
            .map_err(|e| RPCError::Network(NetworkError::new(&e)))
    }
}

impl RaftNetworkFactory<TypeConfig> for GaggleNetworkFactory {
    type Network = GaggleNetwork;

    async fn new_client(&mut self, target: NodeIdType, node: &GaggleNode) -> Self::Network {
        GaggleNetwork {
            target,
            target_addr: node.addr.clone(),
            client: self.client.clone(),
        }
    }
}

impl RaftNetwork<TypeConfig> for GaggleNetwork {
    async fn append_entries(
        &mut self,
        req: AppendEntriesRequest<TypeConfig>,
        _option: RPCOption,
    ) -> Result<
        AppendEntriesResponse<NodeIdType>,
        RPCError<NodeIdType, GaggleNode, RaftError<NodeIdType>>,
    > {
        self.send_rpc("append_entries", &req).await
    }

    async fn install_snapshot(
        &mut self,
        req: InstallSnapshotRequest<TypeConfig>,
        _option: RPCOption,
    ) -> Result<
        InstallSnapshotResponse<NodeIdType>,
        RPCError<NodeIdType, GaggleNode, RaftError<NodeIdType, InstallSnapshotError>>,
    > {
        self.send_rpc("install_snapshot", &req).await
    }

    async fn vote(
        &mut self,
        req: VoteRequest<NodeIdType>,
        _option: RPCOption,
    ) -> Result<VoteResponse<NodeIdType>, RPCError<NodeIdType, GaggleNode, RaftError<NodeIdType>>>
    {
        self.send_rpc("vote", &req).await
    }
}
