//! Control transfer boundary.
//!
//! Every bus-engine command is one vendor control transfer addressed to the
//! device. [`ControlTransport`] is the seam between the protocol client and
//! whatever carries those transfers: the USB stack, an in-process engine, or
//! the scripted [`mock::MockTransport`].

use std::time::Duration;

use smbusb_protocol::Command;

use crate::error::TransportError;

/// Setup fields of a vendor request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VendorRequest {
    pub command: Command,
    /// "Address" field.
    pub value: u16,
    /// "Command" field.
    pub index: u16,
}

impl VendorRequest {
    pub fn new(command: Command, value: u16, index: u16) -> Self {
        Self {
            command,
            value,
            index,
        }
    }
}

/// Carrier of vendor control transfers.
pub trait ControlTransport {
    /// Device-to-host transfer of at most `length` bytes.
    ///
    /// # Errors
    ///
    /// [`TransportError::Stall`] when the device reports the command failed.
    fn control_in(
        &mut self,
        request: VendorRequest,
        length: u16,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError>;

    /// Host-to-device transfer. Returns the number of bytes sent.
    ///
    /// # Errors
    ///
    /// [`TransportError::Stall`] when the device reports the command failed.
    fn control_out(
        &mut self,
        request: VendorRequest,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, TransportError>;
}

impl<T: ControlTransport + ?Sized> ControlTransport for &mut T {
    fn control_in(
        &mut self,
        request: VendorRequest,
        length: u16,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        (**self).control_in(request, length, timeout)
    }

    fn control_out(
        &mut self,
        request: VendorRequest,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        (**self).control_out(request, data, timeout)
    }
}

pub mod mock {
    //! Scripted transport for unit tests.

    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use super::*;

    /// One recorded transfer.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Transfer {
        In {
            request: VendorRequest,
            length: u16,
            timeout: Duration,
        },
        Out {
            request: VendorRequest,
            data: Vec<u8>,
            timeout: Duration,
        },
    }

    impl Transfer {
        pub fn request(&self) -> VendorRequest {
            match self {
                Transfer::In { request, .. } | Transfer::Out { request, .. } => *request,
            }
        }
    }

    #[derive(Debug, Default)]
    struct Script {
        replies: VecDeque<Result<Vec<u8>, TransportError>>,
        history: Vec<Transfer>,
    }

    /// Replays queued replies in order and records every transfer.
    ///
    /// IN transfers pop a reply and truncate it to the requested length.
    /// OUT transfers pop a reply too; an `Ok` reply of any content counts as
    /// success. When the queue is empty, IN transfers stall and OUT transfers
    /// succeed.
    #[derive(Debug, Clone, Default)]
    pub struct MockTransport {
        script: Arc<Mutex<Script>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn queue_reply(&self, data: &[u8]) {
            if let Ok(mut script) = self.script.lock() {
                script.replies.push_back(Ok(data.to_vec()));
            }
        }

        pub fn queue_error(&self, error: TransportError) {
            if let Ok(mut script) = self.script.lock() {
                script.replies.push_back(Err(error));
            }
        }

        pub fn history(&self) -> Vec<Transfer> {
            self.script
                .lock()
                .map(|s| s.history.clone())
                .unwrap_or_default()
        }

        pub fn pending_replies(&self) -> usize {
            self.script.lock().map(|s| s.replies.len()).unwrap_or(0)
        }
    }

    impl ControlTransport for MockTransport {
        fn control_in(
            &mut self,
            request: VendorRequest,
            length: u16,
            timeout: Duration,
        ) -> Result<Vec<u8>, TransportError> {
            let mut script = self
                .script
                .lock()
                .map_err(|e| TransportError::Other(e.to_string()))?;
            script.history.push(Transfer::In {
                request,
                length,
                timeout,
            });
            let mut data = script.replies.pop_front().unwrap_or(Err(TransportError::Stall))?;
            data.truncate(usize::from(length));
            Ok(data)
        }

        fn control_out(
            &mut self,
            request: VendorRequest,
            data: &[u8],
            timeout: Duration,
        ) -> Result<usize, TransportError> {
            let mut script = self
                .script
                .lock()
                .map_err(|e| TransportError::Other(e.to_string()))?;
            script.history.push(Transfer::Out {
                request,
                data: data.to_vec(),
                timeout,
            });
            match script.replies.pop_front() {
                Some(Err(e)) => Err(e),
                Some(Ok(_)) | None => Ok(data.len()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::{MockTransport, Transfer};
    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(100);

    #[test]
    fn test_mock_replays_in_order() -> Result<(), TransportError> {
        let mut mock = MockTransport::new();
        mock.queue_reply(&[1, 2, 3]);
        mock.queue_error(TransportError::Timeout);
        let request = VendorRequest::new(Command::InterfaceId, 0, 0);

        assert_eq!(mock.control_in(request, 2, TIMEOUT)?, vec![1, 2]);
        assert_eq!(mock.control_in(request, 3, TIMEOUT), Err(TransportError::Timeout));
        assert_eq!(mock.control_in(request, 3, TIMEOUT), Err(TransportError::Stall));
        assert_eq!(mock.history().len(), 3);
        Ok(())
    }

    #[test]
    fn test_mock_records_out_data() -> Result<(), TransportError> {
        let mut mock = MockTransport::new();
        let request = VendorRequest::new(Command::WriteWord, 0x16, 0x21);
        assert_eq!(mock.control_out(request, &[0xCD, 0xAB], TIMEOUT)?, 2);
        assert_eq!(
            mock.history(),
            vec![Transfer::Out {
                request,
                data: vec![0xCD, 0xAB],
                timeout: TIMEOUT
            }]
        );
        Ok(())
    }

    #[test]
    fn test_clones_share_script() -> Result<(), TransportError> {
        let observer = MockTransport::new();
        let mut transport = observer.clone();
        transport.control_out(VendorRequest::new(Command::ResetInterface, 0, 0), &[], TIMEOUT)?;
        assert_eq!(observer.history().len(), 1);
        Ok(())
    }
}
