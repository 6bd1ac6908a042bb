//! Integration tests for podlayer

mod test_orchestrate;
mod test_readiness_fsm;
mod test_scheduler;
