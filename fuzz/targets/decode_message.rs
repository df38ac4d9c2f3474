#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use spacestore::protocol::{
    check_frame_len, recover_request_id, Command, Delivery, Message, MessageKind, Response,
};

#[derive(Debug, Arbitrary)]
struct FuzzFrame {
    declared_len: u32,
    body: Vec<u8>,
}

fuzz_target!(|input: FuzzFrame| {
    let _ = check_frame_len(input.declared_len);
    let _ = recover_request_id(&input.body);

    let Ok(message) = Message::decode(&input.body) else {
        return;
    };
    match message.kind {
        MessageKind::Command => {
            if let Ok(cmd) = Command::decode(message.payload) {
                // Разобранная команда кодируется обратно в ту же нагрузку.
                let bytes = cmd.to_bytes().expect("re-encode failed");
                assert_eq!(Command::decode(&bytes).expect("re-decode failed"), cmd);
            }
        }
        MessageKind::Response => {
            if let Ok(resp) = Response::decode(message.payload) {
                if resp.is_delivery() {
                    let _ = Delivery::decode(&resp.body);
                }
            }
        }
    }
});
