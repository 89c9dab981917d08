use crate::failure::{Failure, Outcome};

/// The unit of work driven by the phase runner.
///
/// Implementations hold an immutable template. `prepare` builds a fresh, independent input for
/// every attempt and must not mutate shared state; `execute` is the timed part.
///
/// A panic in either method becomes a `Panic` failure for that attempt. It is logged at debug
/// level and does not reach the process panic hook.
pub trait Operation: Send + Sync {
    type Input: Send;

    fn prepare(&self) -> Result<Self::Input, Failure>;

    fn execute(&self, input: Self::Input) -> Outcome;
}

/// Adapts a closure into an [`Operation`] with a unit input.
pub struct FnOperation<F>(F);

impl<F> FnOperation<F>
where
    F: Fn() -> Outcome + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> Operation for FnOperation<F>
where
    F: Fn() -> Outcome + Send + Sync,
{
    type Input = ();

    fn prepare(&self) -> Result<(), Failure> {
        Ok(())
    }

    fn execute(&self, _input: ()) -> Outcome {
        (self.0)()
    }
}
