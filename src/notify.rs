//! Structural change notifications.
//!
//! Every structural operation of the tree emits a pre-change event before it
//! modifies anything and a post-change event once it is done. Listeners are
//! subscribed at a module and receive events emitted at that module or at any
//! of its descendants.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use log::warn;
use serde::Serialize;

use crate::gate::{GateRef, GateType};
use crate::registry::ComponentId;
use crate::tree::ModuleRef;

/// Announced before a structural change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PreModelChange {
    GateAdd {
        module: ModuleRef,
        name: String,
        gate_type: GateType,
        is_vector: bool,
    },
    GateDelete {
        module: ModuleRef,
        name: String,
    },
    GateVectorResize {
        module: ModuleRef,
        name: String,
        new_size: usize,
    },
    GateConnect {
        from: GateRef,
        to: GateRef,
    },
    GateDisconnect {
        from: GateRef,
        to: GateRef,
    },
    ModuleAdd {
        parent: Option<ModuleRef>,
        type_name: String,
        name: String,
        index: Option<usize>,
    },
    ModuleReparent {
        module: ModuleRef,
        new_parent: ModuleRef,
    },
    ModuleDelete {
        module: ModuleRef,
    },
}

/// What is left of a module once it has been deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletedModuleInfo {
    /// Handle the module had; now stale.
    pub module: ModuleRef,
    pub former_id: ComponentId,
    pub type_name: String,
    pub name: String,
    /// Parent the module was removed from.
    pub parent: Option<ModuleRef>,
    /// Size of the submodule vector the module belonged to.
    pub vector_size: Option<usize>,
    pub index: Option<usize>,
}

/// Reported after a structural change (or lifecycle milestone).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PostModelChange {
    GateAdded {
        module: ModuleRef,
        name: String,
    },
    GateDeleted {
        module: ModuleRef,
        name: String,
        gate_type: GateType,
        is_vector: bool,
        vector_size: Option<usize>,
    },
    GateVectorResized {
        module: ModuleRef,
        name: String,
        old_size: usize,
    },
    GateConnected {
        from: GateRef,
        to: GateRef,
    },
    GateDisconnected {
        from: GateRef,
        to: GateRef,
    },
    ModuleAdded {
        module: ModuleRef,
    },
    ModuleReparented {
        module: ModuleRef,
        old_parent: ModuleRef,
        old_id: ComponentId,
    },
    ModuleBuilt {
        module: ModuleRef,
    },
    ModuleInitialized {
        module: ModuleRef,
    },
    ModuleDeleted(DeletedModuleInfo),
}

/// Receiver of structural change notifications.
pub trait ModelListener {
    fn pre_model_change(&mut self, _change: &PreModelChange) {}

    fn post_model_change(&mut self, _change: &PostModelChange) {}
}

impl<L: ModelListener + ?Sized> ModelListener for Rc<RefCell<L>> {
    fn pre_model_change(&mut self, change: &PreModelChange) {
        self.borrow_mut().pre_model_change(change);
    }

    fn post_model_change(&mut self, change: &PostModelChange) {
        self.borrow_mut().post_model_change(change);
    }
}

/// Subscription handle returned by [`crate::ModuleTree::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub(crate) u64);

/// Either half of a change, as forwarded by [`ChannelSink`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ModelChangeRecord {
    Pre(PreModelChange),
    Post(PostModelChange),
}

/// Forwards notifications into a bounded crossbeam channel.
///
/// Sending never blocks: when the channel is full (or the receiver is gone) the
/// record is dropped and counted. Clones share the drop counter.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<ModelChangeRecord>,
    dropped: Arc<AtomicU64>,
}

impl ChannelSink {
    /// Creates a sink and the receiving end of its channel.
    #[must_use]
    pub fn bounded(capacity: usize) -> (Self, Receiver<ModelChangeRecord>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        (
            Self {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    /// Number of records dropped so far.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn forward(&self, record: ModelChangeRecord) {
        match self.tx.try_send(record) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!("model change sink full, dropped notification ({total} dropped so far)");
            }
            Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

impl ModelListener for ChannelSink {
    fn pre_model_change(&mut self, change: &PreModelChange) {
        self.forward(ModelChangeRecord::Pre(change.clone()));
    }

    fn post_model_change(&mut self, change: &PostModelChange) {
        self.forward(ModelChangeRecord::Post(change.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn added(i: u32) -> PostModelChange {
        PostModelChange::ModuleAdded {
            module: ModuleRef::new(i, 0),
        }
    }

    #[test]
    fn test_channel_sink_forwards_in_order() {
        let (mut sink, rx) = ChannelSink::bounded(8);
        sink.pre_model_change(&PreModelChange::ModuleDelete {
            module: ModuleRef::new(1, 0),
        });
        sink.post_model_change(&added(2));
        let got: Vec<_> = rx.try_iter().collect();
        assert_eq!(got.len(), 2);
        assert!(matches!(got[0], ModelChangeRecord::Pre(_)));
        assert_eq!(got[1], ModelChangeRecord::Post(added(2)));
        assert_eq!(sink.dropped(), 0);
    }

    #[test]
    fn test_channel_sink_counts_drops_when_full() {
        let (mut sink, rx) = ChannelSink::bounded(1);
        let observer = sink.clone();
        sink.post_model_change(&added(1));
        sink.post_model_change(&added(2));
        sink.post_model_change(&added(3));
        assert_eq!(observer.dropped(), 2);
        assert_eq!(rx.try_iter().count(), 1);
    }

    #[test]
    fn test_channel_sink_counts_drops_after_disconnect() {
        let (mut sink, rx) = ChannelSink::bounded(4);
        drop(rx);
        sink.post_model_change(&added(1));
        assert_eq!(sink.dropped(), 1);
    }

    #[test]
    fn test_records_serialize() {
        let json = serde_json::to_string(&ModelChangeRecord::Post(added(4))).unwrap();
        assert!(json.contains("ModuleAdded"));
    }
}
