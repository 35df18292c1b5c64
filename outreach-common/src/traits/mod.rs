pub mod fsm;

pub use fsm::FiniteStateMachine;
