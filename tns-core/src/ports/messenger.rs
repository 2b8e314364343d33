use crate::models::{NodeId, TransactiveRecord};

/// Delivery of transactive records between neighboring nodes.
///
/// An implementation is bound to the local node, so `send` and `receive`
/// only name the remote end. Delivery is at-least-once: receivers must treat a
/// record with the same interval name and record number as a replacement of
/// the earlier one, never as an addition.
pub trait Messenger {
    /// Error type for transport failures
    type Error: std::error::Error + Send + Sync + 'static;

    /// Hand a record set to the transport for delivery to `to`.
    fn send(
        &self,
        to: &NodeId,
        records: Vec<TransactiveRecord>,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// The latest records `from` has sent to this node.
    ///
    /// An empty list means nothing has arrived yet, which is not an error.
    fn receive(
        &self,
        from: &NodeId,
    ) -> impl Future<Output = Result<Vec<TransactiveRecord>, Self::Error>> + Send;
}
