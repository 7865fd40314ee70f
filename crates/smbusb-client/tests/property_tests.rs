//! Property-based tests for client chunking against a scripted transport.
//!
//! Every control transfer the client issues must stay within 64 bytes, and
//! whole values must survive being split into transfers and reassembled.

use smbusb_client::transport::mock::{MockTransport, Transfer};
use smbusb_client::{ClientConfig, ReadFlags, SmbusClient, WriteFlags};
use smbusb_protocol::Command;
use proptest::prelude::*;

fn client(mock: &MockTransport) -> Result<SmbusClient<MockTransport>, TestCaseError> {
    let config = ClientConfig::builder()
        .verify_identity(false)
        .build()
        .map_err(|e| TestCaseError::fail(e.to_string()))?;
    SmbusClient::open(mock.clone(), config).map_err(|e| TestCaseError::fail(e.to_string()))
}

fn out_payloads(mock: &MockTransport) -> Vec<Vec<u8>> {
    mock.history()
        .into_iter()
        .filter_map(|t| match t {
            Transfer::Out { data, .. } => Some(data),
            Transfer::In { .. } => None,
        })
        .collect()
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(200))]

    // -- Block write ----------------------------------------------------------

    /// Concatenated write-block payloads are exactly `[len] + data`.
    #[test]
    fn prop_block_write_frames_data(data in proptest::collection::vec(any::<u8>(), 0..=255)) {
        let mock = MockTransport::new();
        let mut client = client(&mock)?;
        client.write_block(0x16, 0x30, &data).map_err(|e| TestCaseError::fail(e.to_string()))?;

        let payloads = out_payloads(&mock);
        prop_assert!(payloads.iter().all(|p| p.len() <= 64));
        let joined: Vec<u8> = payloads.concat();
        prop_assert_eq!(joined.first().copied(), u8::try_from(data.len()).ok());
        prop_assert_eq!(joined.get(1..), Some(data.as_slice()));
    }

    // -- Block read -----------------------------------------------------------

    /// A block served in device-sized responses is reassembled intact with
    /// one read-block call per response.
    #[test]
    fn prop_block_read_reassembles(data in proptest::collection::vec(any::<u8>(), 0..=255)) {
        let mock = MockTransport::new();
        let mut client = client(&mock)?;
        let mut frame = vec![u8::try_from(data.len()).unwrap_or(u8::MAX)];
        frame.extend_from_slice(&data);
        let responses = frame.chunks(64).count();
        for piece in frame.chunks(64) {
            mock.queue_reply(piece);
        }

        let read = client.read_block(0x16, 0x30).map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(read, data);
        prop_assert_eq!(mock.history().len(), responses);
        prop_assert!(mock.history().iter().all(|t| t.request().command == Command::ReadBlock));
    }

    // -- Raw chaining ---------------------------------------------------------

    /// Start goes only on the first raw-write call, stop only on the last.
    #[test]
    fn prop_raw_write_flags_bracket_the_transaction(len in 1usize..600) {
        let mock = MockTransport::new();
        let mut client = client(&mock)?;
        let data = vec![0xA5u8; len];
        client
            .raw_write(&data, WriteFlags::START | WriteFlags::STOP)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;

        let history = mock.history();
        let flags: Vec<WriteFlags> = history
            .iter()
            .map(|t| WriteFlags::from_bits_truncate(t.request().index))
            .collect();
        prop_assert_eq!(flags.iter().filter(|f| f.contains(WriteFlags::START)).count(), 1);
        prop_assert_eq!(flags.iter().filter(|f| f.contains(WriteFlags::STOP)).count(), 1);
        prop_assert!(flags.first().is_some_and(|f| f.contains(WriteFlags::START)));
        prop_assert!(flags.last().is_some_and(|f| f.contains(WriteFlags::STOP)));
        prop_assert_eq!(out_payloads(&mock).concat(), data);
    }

    /// Raw reads never end on a lone byte when PEC is off.
    #[test]
    fn prop_raw_read_requests_cover_length(len in 2usize..600) {
        let mock = MockTransport::new();
        let mut client = client(&mock)?;
        client.set_pec(false).map_err(|e| TestCaseError::fail(e.to_string()))?;
        for chunk in smbusb_client::plan_raw_read(len, false) {
            mock.queue_reply(&vec![0u8; chunk.len]);
        }

        let data = client
            .raw_read(len, ReadFlags::FIRST | ReadFlags::LAST)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(data.len(), len);

        let reads: Vec<u16> = mock
            .history()
            .iter()
            .filter(|t| t.request().command == Command::Read)
            .map(|t| t.request().value)
            .collect();
        prop_assert!(reads.iter().all(|&n| n <= 64));
        prop_assert!(reads.last().is_some_and(|&n| n >= 2));
    }
}
