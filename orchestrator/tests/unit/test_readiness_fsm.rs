//! Readiness FSM tests

use podlayer::readiness::state::{ReadinessEvent, ReadinessFsm, ReadinessState};

#[test]
fn test_fsm_initial_state() {
    let fsm = ReadinessFsm::new();
    assert_eq!(fsm.state(), &ReadinessState::Created);
    assert!(fsm.error().is_none());
    assert!(!fsm.state().is_terminal());
}

#[test]
fn test_fsm_no_health_check_flow() {
    let mut fsm = ReadinessFsm::new();

    // Created -> ContainersPending -> ContainersCreated
    fsm.process(ReadinessEvent::AwaitContainers).unwrap();
    assert_eq!(fsm.state(), &ReadinessState::ContainersPending);
    fsm.process(ReadinessEvent::ContainersObserved).unwrap();

    // ContainersCreated -> NoHealthCheckDeclared -> Ready
    fsm.process(ReadinessEvent::NoHealthCheck).unwrap();
    assert_eq!(fsm.state(), &ReadinessState::NoHealthCheckDeclared);
    fsm.process(ReadinessEvent::Converged).unwrap();
    assert_eq!(fsm.state(), &ReadinessState::Ready);
}

#[test]
fn test_fsm_timeouts() {
    let mut creation = ReadinessFsm::new();
    creation.process(ReadinessEvent::AwaitContainers).unwrap();
    creation.process(ReadinessEvent::DeadlineExceeded).unwrap();
    assert_eq!(creation.state(), &ReadinessState::TimedOut);

    let mut health = ReadinessFsm::new();
    health.process(ReadinessEvent::AwaitContainers).unwrap();
    health.process(ReadinessEvent::ContainersObserved).unwrap();
    health.process(ReadinessEvent::HealthCheckDeclared).unwrap();
    health.process(ReadinessEvent::DeadlineExceeded).unwrap();
    assert_eq!(health.state(), &ReadinessState::TimedOut);
    assert!(health.state().is_terminal());
}

#[test]
fn test_fsm_invalid_transition() {
    let mut fsm = ReadinessFsm::new();

    // Cannot converge before containers exist
    assert!(fsm.process(ReadinessEvent::Converged).is_err());
    assert_eq!(fsm.state(), &ReadinessState::Created);

    // Nothing leaves a terminal state
    fsm.process(ReadinessEvent::AwaitContainers).unwrap();
    fsm.process(ReadinessEvent::DeadlineExceeded).unwrap();
    assert!(fsm.process(ReadinessEvent::AwaitContainers).is_err());
}
