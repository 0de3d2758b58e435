//! The boundary between the action engine and a simulator.
//!
//! One call to [`Transport::communicate`] is one simulation tick: the
//! outgoing instruction batch is applied and the resulting response frames
//! come back.

use replicant_types::{Instruction, ReplicantError, ResponseFrame};

/// Exchanges an instruction batch for the next tick's response frames.
pub trait Transport {
    fn communicate(
        &mut self,
        instructions: Vec<Instruction>,
    ) -> Result<Vec<ResponseFrame>, ReplicantError>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn communicate(
        &mut self,
        instructions: Vec<Instruction>,
    ) -> Result<Vec<ResponseFrame>, ReplicantError> {
        (**self).communicate(instructions)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn communicate(
        &mut self,
        instructions: Vec<Instruction>,
    ) -> Result<Vec<ResponseFrame>, ReplicantError> {
        (**self).communicate(instructions)
    }
}

/// Wraps a transport and keeps every instruction batch it forwarded.
///
/// Tests use it to assert what an action sent on a given tick.
#[derive(Debug, Default)]
pub struct Recorder<T> {
    inner: T,
    batches: Vec<Vec<Instruction>>,
}

impl<T: Transport> Recorder<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            batches: Vec::new(),
        }
    }

    /// Every batch sent so far, oldest first.
    pub fn batches(&self) -> &[Vec<Instruction>] {
        &self.batches
    }

    pub fn last_batch(&self) -> Option<&[Instruction]> {
        self.batches.last().map(Vec::as_slice)
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Transport> Transport for Recorder<T> {
    fn communicate(
        &mut self,
        instructions: Vec<Instruction>,
    ) -> Result<Vec<ResponseFrame>, ReplicantError> {
        self.batches.push(instructions.clone());
        self.inner.communicate(instructions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl Transport for Echo {
        fn communicate(
            &mut self,
            instructions: Vec<Instruction>,
        ) -> Result<Vec<ResponseFrame>, ReplicantError> {
            Ok(vec![ResponseFrame::Framerate {
                framerate: instructions.len() as u32,
            }])
        }
    }

    struct Broken;

    impl Transport for Broken {
        fn communicate(
            &mut self,
            _instructions: Vec<Instruction>,
        ) -> Result<Vec<ResponseFrame>, ReplicantError> {
            Err(ReplicantError::Transport("connection reset".to_string()))
        }
    }

    #[test]
    fn recorder_keeps_batches_in_order() {
        let mut rec = Recorder::new(Echo);
        rec.communicate(vec![Instruction::Brake { id: 0 }]).unwrap();
        let frames = rec.communicate(Vec::new()).unwrap();
        assert_eq!(frames, vec![ResponseFrame::Framerate { framerate: 0 }]);
        assert_eq!(rec.batches().len(), 2);
        assert_eq!(rec.batches()[0], vec![Instruction::Brake { id: 0 }]);
        assert_eq!(rec.last_batch(), Some(&[][..]));
    }

    #[test]
    fn errors_pass_through_boxed_transports() {
        let mut boxed: Box<dyn Transport> = Box::new(Broken);
        let err = boxed.communicate(Vec::new()).unwrap_err();
        assert!(matches!(err, ReplicantError::Transport(_)));
    }
}
