//! Behavioural suites for the dispatch daemon.

mod socket_behaviour;
pub(crate) mod support;
