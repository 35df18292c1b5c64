/// A state that advances by consuming an input.
///
/// Unlike a total transition function, an input that has no edge out of the
/// current state is rejected with `Self::Error` and the caller keeps the
/// original state.
pub trait FiniteStateMachine: Sized {
    type Input;
    type Error;

    fn transition(self, input: Self::Input) -> Result<Self, Self::Error>;
}
