//! Channels: the objects mediating a connection.
//!
//! A channel is stored in the source gate of its link and listed by the module
//! that contains the connection. It follows the same multi-stage
//! initialization, finish and pre-delete protocol as modules, driven by the
//! module tree.

use std::fmt;

use crate::error::ModelResult;
use crate::tree::ModuleRef;

/// User-facing behavior of a channel.
pub trait ChannelBehavior {
    fn channel_type(&self) -> &str;

    fn num_init_stages(&self) -> usize {
        1
    }

    fn initialize(&mut self, _stage: usize) -> ModelResult<()> {
        Ok(())
    }

    fn finish(&mut self) -> ModelResult<()> {
        Ok(())
    }

    fn pre_delete(&mut self) -> ModelResult<()> {
        Ok(())
    }
}

/// Zero-delay, infinite-bandwidth channel without callbacks.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdealChannel;

impl ChannelBehavior for IdealChannel {
    fn channel_type(&self) -> &str {
        "IdealChannel"
    }
}

/// A channel attached to a connection.
pub struct Channel {
    owner: Option<ModuleRef>,
    behavior: Box<dyn ChannelBehavior>,
    initialized: bool,
    pre_deleted: bool,
}

impl Channel {
    /// Wraps `behavior`; the owner is set on connection.
    #[must_use]
    pub fn new(behavior: impl ChannelBehavior + 'static) -> Self {
        Self {
            owner: None,
            behavior: Box::new(behavior),
            initialized: false,
            pre_deleted: false,
        }
    }

    #[must_use]
    pub fn ideal() -> Self {
        Self::new(IdealChannel)
    }

    /// Module containing the connection; set when the channel is connected.
    #[must_use]
    pub const fn owner(&self) -> Option<ModuleRef> {
        self.owner
    }

    #[must_use]
    pub fn channel_type(&self) -> &str {
        self.behavior.channel_type()
    }

    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub(crate) fn set_owner(&mut self, owner: ModuleRef) {
        self.owner = Some(owner);
    }

    /// Runs stage `stage` unless already initialized. Returns true if more
    /// stages remain.
    pub(crate) fn initialize_stage(&mut self, stage: usize) -> ModelResult<bool> {
        if self.initialized {
            return Ok(false);
        }
        let stages = self.behavior.num_init_stages();
        if stage < stages {
            self.behavior.initialize(stage)?;
        }
        let more = stage + 1 < stages;
        if !more {
            self.initialized = true;
        }
        Ok(more)
    }

    pub(crate) fn finish(&mut self) -> ModelResult<()> {
        self.behavior.finish()
    }

    /// Runs the behavior's `pre_delete` at most once.
    pub(crate) fn pre_delete(&mut self) -> ModelResult<()> {
        if self.pre_deleted {
            return Ok(());
        }
        self.pre_deleted = true;
        self.behavior.pre_delete()
    }
}

impl Default for Channel {
    fn default() -> Self {
        Self::ideal()
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("type", &self.channel_type())
            .field("owner", &self.owner)
            .field("initialized", &self.initialized)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Staged {
        seen: std::rc::Rc<std::cell::RefCell<Vec<usize>>>,
    }

    impl ChannelBehavior for Staged {
        fn channel_type(&self) -> &str {
            "Staged"
        }

        fn num_init_stages(&self) -> usize {
            3
        }

        fn initialize(&mut self, stage: usize) -> ModelResult<()> {
            self.seen.borrow_mut().push(stage);
            Ok(())
        }
    }

    #[test]
    fn test_stages_run_until_exhausted() {
        let seen = std::rc::Rc::default();
        let mut ch = Channel::new(Staged {
            seen: std::rc::Rc::clone(&seen),
        });
        assert!(ch.initialize_stage(0).unwrap());
        assert!(ch.initialize_stage(1).unwrap());
        assert!(!ch.initialize_stage(2).unwrap());
        assert!(ch.is_initialized());
        assert!(!ch.initialize_stage(3).unwrap());
        assert_eq!(*seen.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn test_ideal_channel_is_single_stage() {
        let mut ch = Channel::ideal();
        assert_eq!(ch.channel_type(), "IdealChannel");
        assert!(!ch.initialize_stage(0).unwrap());
        assert!(ch.is_initialized());
    }

    struct Counting {
        calls: std::rc::Rc<std::cell::Cell<usize>>,
    }

    impl ChannelBehavior for Counting {
        fn channel_type(&self) -> &str {
            "Counting"
        }

        fn pre_delete(&mut self) -> ModelResult<()> {
            self.calls.set(self.calls.get() + 1);
            Ok(())
        }
    }

    #[test]
    fn test_pre_delete_runs_once() {
        let calls = std::rc::Rc::default();
        let mut ch = Channel::new(Counting {
            calls: std::rc::Rc::clone(&calls),
        });
        ch.pre_delete().unwrap();
        ch.pre_delete().unwrap();
        assert_eq!(calls.get(), 1);
    }
}
