use super::RequestError;
use bitflags::bitflags;

bitflags! {
    /// Controls how a [`RequestQueue`] drains when it is shut down.
    ///
    /// `QUEUE_STOP_IF_EMPTY` and `QUEUE_STOP_IMMEDIATELY` are mutually
    /// exclusive. If neither is given, `QUEUE_STOP_IF_EMPTY` is assumed.
    ///
    /// [`RequestQueue`]: super::RequestQueue
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    pub struct ShutdownOption: u8 {
        /// Execute every request already queued, then stop the worker.
        const QUEUE_STOP_IF_EMPTY = 1;
        /// Stop after the request in flight, cancelling everything queued.
        const QUEUE_STOP_IMMEDIATELY = 1 << 1;
        /// Keep accepting new requests until the worker has stopped.
        const QUEUE_ACCEPT_NEW_FUTURES = 1 << 2;
    }
}

impl ShutdownOption {
    const EXCLUSIVE: Self = Self::QUEUE_STOP_IF_EMPTY.union(Self::QUEUE_STOP_IMMEDIATELY);

    /// Checks that no mutually exclusive options are combined, filling in the
    /// implied stop mode.
    pub fn validate(self) -> Result<Self, RequestError> {
        if self.contains(Self::EXCLUSIVE) {
            return Err(RequestError::InvalidShutdownOptions(self));
        }

        if self.intersects(Self::EXCLUSIVE) {
            Ok(self)
        } else {
            Ok(self | Self::QUEUE_STOP_IF_EMPTY)
        }
    }

    /// Whether new submissions should be refused under these options.
    pub(crate) fn refuses_new(self) -> bool {
        self.contains(Self::QUEUE_STOP_IMMEDIATELY) || !self.contains(Self::QUEUE_ACCEPT_NEW_FUTURES)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn exclusive_stop_modes_are_rejected() {
        let both = ShutdownOption::QUEUE_STOP_IF_EMPTY | ShutdownOption::QUEUE_STOP_IMMEDIATELY;
        assert!(matches!(
            both.validate(),
            Err(RequestError::InvalidShutdownOptions(_))
        ));
    }

    #[test]
    fn stop_if_empty_is_implied() {
        let opts = ShutdownOption::QUEUE_ACCEPT_NEW_FUTURES.validate().unwrap();
        assert!(opts.contains(ShutdownOption::QUEUE_STOP_IF_EMPTY));
        assert!(!opts.refuses_new());

        let opts = ShutdownOption::empty().validate().unwrap();
        assert_eq!(opts, ShutdownOption::QUEUE_STOP_IF_EMPTY);
        assert!(opts.refuses_new());
    }

    #[test]
    fn immediate_stop_never_accepts() {
        let opts = (ShutdownOption::QUEUE_STOP_IMMEDIATELY
            | ShutdownOption::QUEUE_ACCEPT_NEW_FUTURES)
            .validate()
            .unwrap();
        assert!(opts.refuses_new());
    }
}
