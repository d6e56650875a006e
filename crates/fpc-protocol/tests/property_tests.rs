//! Property-based tests for record decoding.
//!
//! Records are decoded from memory the trustlet wrote, so decoding must never
//! panic regardless of the content or length of the buffer.

use fpc_protocol::{
    AuthChallenge, AuthResult, BufferCommand, Command, FingerprintList, Header, Identify,
    KeymasterResponse, Record, SetGid, decode_record, encode_record,
};
use proptest::prelude::*;

/// Strategy for picking any known command.
fn any_command() -> impl Strategy<Value = Command> {
    prop::sample::select(Command::all().to_vec())
}

proptest! {
    /// Property: arbitrary bytes never make a decoder panic.
    #[test]
    fn prop_decode_arbitrary_bytes(bytes in prop::collection::vec(any::<u8>(), 0..160)) {
        let _ = decode_record::<AuthChallenge>(&bytes);
        let _ = decode_record::<Identify>(&bytes);
        let _ = decode_record::<FingerprintList>(&bytes);
        let _ = decode_record::<AuthResult>(&bytes);
        let _ = decode_record::<BufferCommand>(&bytes);
        let _ = decode_record::<KeymasterResponse>(&bytes);
        let _ = Header::peek(&bytes);
    }

    /// Property: a decoder succeeds exactly when the buffer covers the record.
    #[test]
    fn prop_fixed_record_length_check(len in 0usize..64) {
        let bytes = vec![0u8; len];
        prop_assert_eq!(decode_record::<SetGid>(&bytes).is_ok(), len >= SetGid::SIZE);
        prop_assert_eq!(decode_record::<Identify>(&bytes).is_ok(), len >= Identify::SIZE);
    }

    /// Property: the header of an encoded buffer command names its command.
    #[test]
    fn prop_buffer_header_identifies_command(
        command in any_command(),
        data in prop::collection::vec(any::<u8>(), 0..256),
    ) {
        let record = BufferCommand::new(command, data.clone());
        let bytes = encode_record(&record);
        prop_assert_eq!(bytes.len(), record.encoded_len());
        prop_assert_eq!(Header::peek(&bytes).unwrap().command(), Some(command));

        let decoded: BufferCommand = decode_record(&bytes).unwrap();
        prop_assert_eq!(decoded.data, data);
    }

    /// Property: the listing never exposes more than the array can hold.
    #[test]
    fn prop_listing_is_bounded(length in any::<u32>()) {
        let mut list = FingerprintList::new();
        list.length = length;
        prop_assert!(list.prints().len() <= 5);
    }
}
