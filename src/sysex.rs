use itertools::Itertools;
use log::*;

pub const START_OF_SYSTEM_EXCLUSIVE: u8 = 0xF0;
pub const EOX: u8 = 0xF7; // end of system exclusive message

const SYSEX_NON_REAL_TIME_CATEGORY: u8 = 0x7E;
const SYSEX_ALL_DEVICES: u8 = 0x7F;
const GENERAL_INFORMATION: u8 = 0x06;
const IDENTITY_REQUEST: u8 = 0x01;

const KORG_FORMAT_ID: u8 = 0x30; // 0x3n, n = global channel
const KORG_VOLCA_SUB_ID: u8 = 0x00;
const PROGRAM_DATA_DUMP_REQUEST: u8 = 0x1E;
const PROGRAM_DATA_DUMP: u8 = 0x4E;

// identity reply: F0 7E <device> 06 02 <manufacturer> <family lsb/msb> <member lsb/msb> <revision x4> F7
const IDENTITY_REPLY_DEVICE_ID_OFFSET: usize = 2;
const IDENTITY_REPLY_IDENTITY_OFFSET: usize = 5;
const IDENTITY_REPLY_REVISION_OFFSET: usize = 10;
const IDENTITY_REPLY_REVISION_SIZE_IN_BYTES: usize = 4;

// program dump: F0 <header x6> <slot> <packed payload> F7
const PROGRAM_DUMP_HEADER_OFFSET: usize = 1;
const PROGRAM_DUMP_SLOT_OFFSET: usize = 7;
const PROGRAM_DUMP_PAYLOAD_OFFSET: usize = 8;

/// Identity of a MIDI device family as it appears in a universal identity reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub manufacturer: u8,
    pub family_lsb: u8,
    pub family_msb: u8,
    pub member_lsb: u8,
    pub member_msb: u8,
}

impl DeviceIdentity {
    pub const fn as_bytes(&self) -> [u8; 5] {
        [self.manufacturer, self.family_lsb, self.family_msb, self.member_lsb, self.member_msb]
    }

    /// Header shared by program dump requests and replies, minus the function code.
    const fn program_dump_prefix(&self) -> [u8; 5] {
        [self.manufacturer, KORG_FORMAT_ID, KORG_VOLCA_SUB_ID, self.family_msb, self.family_lsb]
    }
}

/// Korg volca fm, 2nd generation
pub const VOLCA_FM2: DeviceIdentity = DeviceIdentity {
    manufacturer: 0x42,
    family_lsb: 0x2F,
    family_msb: 0x01,
    member_lsb: 0x08,
    member_msb: 0x00,
};

/// A universal identity reply sent by a volca fm 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityReply<'a> {
    message: &'a [u8],
}

impl<'a> IdentityReply<'a> {
    pub fn device_id(&self) -> u8 {
        self.message[IDENTITY_REPLY_DEVICE_ID_OFFSET]
    }

    pub fn identity(&self) -> DeviceIdentity {
        let fields = &self.message[IDENTITY_REPLY_IDENTITY_OFFSET..IDENTITY_REPLY_IDENTITY_OFFSET + 5];
        DeviceIdentity {
            manufacturer: fields[0],
            family_lsb: fields[1],
            family_msb: fields[2],
            member_lsb: fields[3],
            member_msb: fields[4],
        }
    }

    /// Four software revision bytes, if the reply carries them.
    pub fn software_revision(&self) -> Option<&'a [u8]> {
        self.message.get(IDENTITY_REPLY_REVISION_OFFSET..IDENTITY_REPLY_REVISION_OFFSET + IDENTITY_REPLY_REVISION_SIZE_IN_BYTES)
    }
}

/// One program of a bank dump, still in its packed 7 bit form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramDump<'a> {
    message: &'a [u8],
}

impl<'a> ProgramDump<'a> {
    pub fn slot(&self) -> u8 {
        self.message[PROGRAM_DUMP_SLOT_OFFSET]
    }

    pub fn payload(&self) -> &'a [u8] {
        &self.message[PROGRAM_DUMP_PAYLOAD_OFFSET..self.message.len() - 1]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SysexMessage<'a> {
    IdentityReply(IdentityReply<'a>),
    ProgramDump(ProgramDump<'a>),
    Unrecognized,
}

trait VolcaSysexMessageHandler {
    fn can_handle(&self, message: &[u8]) -> bool;
    fn handle<'a>(&self, message: &'a [u8]) -> SysexMessage<'a>;
    fn name(&self) -> String;
}

struct IdentityReplyMessageHandler;

impl VolcaSysexMessageHandler for IdentityReplyMessageHandler {
    fn can_handle(&self, message: &[u8]) -> bool {
        if message.first() != Some(&START_OF_SYSTEM_EXCLUSIVE) {
            return false
        }

        match message.get(IDENTITY_REPLY_IDENTITY_OFFSET..IDENTITY_REPLY_IDENTITY_OFFSET + 5) {
            Some(identity) if identity == VOLCA_FM2.as_bytes() => true,
            _ => {
                trace!("{}: identity bytes do not match.", self.name());
                false
            }
        }
    }

    fn handle<'a>(&self, message: &'a [u8]) -> SysexMessage<'a> {
        SysexMessage::IdentityReply(IdentityReply { message })
    }

    fn name(&self) -> String {
        String::from("IdentityReplyMessageHandler")
    }
}

struct ProgramDumpMessageHandler;

impl VolcaSysexMessageHandler for ProgramDumpMessageHandler {
    fn can_handle(&self, message: &[u8]) -> bool {
        if message.len() <= PROGRAM_DUMP_PAYLOAD_OFFSET {
            return false
        }

        for (index, sysex_byte) in message.iter().enumerate() {
            if index == 0 && *sysex_byte != START_OF_SYSTEM_EXCLUSIVE {
                return false
            }
            else if (PROGRAM_DUMP_HEADER_OFFSET..PROGRAM_DUMP_SLOT_OFFSET).contains(&index)
                && *sysex_byte != program_dump_header()[index - PROGRAM_DUMP_HEADER_OFFSET] {
                trace!("{}: header byte {} incorrect.", self.name(), index);
                return false
            }
            else if (index + 1) == message.len() && *sysex_byte != EOX {
                debug!("{}: Sysex is not terminated properly.", self.name());
                return false
            }
        }

        true
    }

    fn handle<'a>(&self, message: &'a [u8]) -> SysexMessage<'a> {
        SysexMessage::ProgramDump(ProgramDump { message })
    }

    fn name(&self) -> String {
        String::from("ProgramDumpMessageHandler")
    }
}

static HANDLERS: [&(dyn VolcaSysexMessageHandler + Sync); 2] = [
    &IdentityReplyMessageHandler,
    &ProgramDumpMessageHandler,
];

/// Sorts an inbound sysex message into the two kinds the volca sends back.
/// Anything else is `Unrecognized`.
pub fn classify(message: &[u8]) -> SysexMessage<'_> {
    for handler in HANDLERS.iter() {
        if handler.can_handle(message) {
            debug!("Found volca sysex message handler: {}", handler.name());
            return handler.handle(message)
        }
    }

    SysexMessage::Unrecognized
}

fn program_dump_header() -> [u8; 6] {
    let prefix = VOLCA_FM2.program_dump_prefix();
    [prefix[0], prefix[1], prefix[2], prefix[3], prefix[4], PROGRAM_DATA_DUMP]
}

/// Universal non-realtime identity request, addressed to every device.
pub fn device_inquiry() -> Vec<u8> {
    vec![
        START_OF_SYSTEM_EXCLUSIVE,
        SYSEX_NON_REAL_TIME_CATEGORY,
        SYSEX_ALL_DEVICES,
        GENERAL_INFORMATION,
        IDENTITY_REQUEST,
        EOX,
    ]
}

pub fn program_dump_request(slot: u8) -> Vec<u8> {
    let mut message = vec![];

    message.push(START_OF_SYSTEM_EXCLUSIVE);
    message.extend_from_slice(&VOLCA_FM2.program_dump_prefix());
    message.push(PROGRAM_DATA_DUMP_REQUEST);
    message.push(slot);
    message.push(EOX);

    message
}

pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{:02X}", byte)).join(" ")
}

#[cfg(test)]
pub(crate) fn program_dump_message(slot: u8, packed: &[u8]) -> Vec<u8> {
    let mut message = vec![START_OF_SYSTEM_EXCLUSIVE];
    message.extend_from_slice(&program_dump_header());
    message.push(slot);
    message.extend_from_slice(packed);
    message.push(EOX);
    message
}

#[cfg(test)]
pub(crate) fn identity_reply_message() -> Vec<u8> {
    vec![0xF0, 0x7E, 0x00, 0x06, 0x02, 0x42, 0x2F, 0x01, 0x08, 0x00, 0x01, 0x00, 0x02, 0x00, 0xF7]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inquiry_is_a_broadcast_identity_request() {
        assert_eq!(device_inquiry(), vec![0xF0, 0x7E, 0x7F, 0x06, 0x01, 0xF7]);
    }

    #[test]
    fn dump_request_carries_the_slot() {
        assert_eq!(program_dump_request(0), vec![0xF0, 0x42, 0x30, 0x00, 0x01, 0x2F, 0x1E, 0x00, 0xF7]);
        assert_eq!(program_dump_request(63)[7], 63);
        assert_eq!(program_dump_request(63).len(), 9);
    }

    #[test]
    fn identity_reply_is_recognized() {
        let message = identity_reply_message();
        match classify(&message) {
            SysexMessage::IdentityReply(reply) => {
                assert_eq!(reply.identity(), VOLCA_FM2);
                assert_eq!(reply.device_id(), 0x00);
                assert_eq!(reply.software_revision(), Some(&[0x01, 0x00, 0x02, 0x00][..]));
            }
            other => panic!("expected identity reply, got {:?}", other),
        }
    }

    #[test]
    fn identity_reply_without_revision_bytes() {
        let message = [0xF0, 0x7E, 0x00, 0x06, 0x02, 0x42, 0x2F, 0x01, 0x08, 0x00];
        match classify(&message) {
            SysexMessage::IdentityReply(reply) => assert_eq!(reply.software_revision(), None),
            other => panic!("expected identity reply, got {:?}", other),
        }
    }

    #[test]
    fn other_korg_identity_is_ignored() {
        // volca fm, 1st generation member id
        let message = [0xF0, 0x7E, 0x00, 0x06, 0x02, 0x42, 0x2F, 0x01, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0xF7];
        assert_eq!(classify(&message), SysexMessage::Unrecognized);
    }

    #[test]
    fn program_dump_is_recognized() {
        let payload = [0x11u8; 152];
        let message = program_dump_message(12, &payload);
        match classify(&message) {
            SysexMessage::ProgramDump(dump) => {
                assert_eq!(dump.slot(), 12);
                assert_eq!(dump.payload(), &payload[..]);
            }
            other => panic!("expected program dump, got {:?}", other),
        }
    }

    #[test]
    fn program_dump_with_empty_payload() {
        let message = program_dump_message(3, &[]);
        match classify(&message) {
            SysexMessage::ProgramDump(dump) => assert!(dump.payload().is_empty()),
            other => panic!("expected program dump, got {:?}", other),
        }
    }

    #[test]
    fn unterminated_program_dump_is_unrecognized() {
        let mut message = program_dump_message(1, &[0u8; 8]);
        message.pop();
        assert_eq!(classify(&message), SysexMessage::Unrecognized);
    }

    #[test]
    fn dump_request_echo_is_unrecognized() {
        assert_eq!(classify(&program_dump_request(5)), SysexMessage::Unrecognized);
    }

    #[test]
    fn non_sysex_and_short_messages_are_unrecognized() {
        assert_eq!(classify(&[]), SysexMessage::Unrecognized);
        assert_eq!(classify(&[0x90, 0x3C, 0x64]), SysexMessage::Unrecognized);
        assert_eq!(classify(&[0xF0, 0xF7]), SysexMessage::Unrecognized);
        assert_eq!(classify(&device_inquiry()), SysexMessage::Unrecognized);
    }

    #[test]
    fn classifications_are_exclusive() {
        // identity needs 0x42 at offset 5, a dump header needs 0x2F there
        assert!(!(IdentityReplyMessageHandler.can_handle(&identity_reply_message())
            && ProgramDumpMessageHandler.can_handle(&identity_reply_message())));

        let dump = program_dump_message(0, &[0u8; 152]);
        assert!(ProgramDumpMessageHandler.can_handle(&dump));
        assert!(!IdentityReplyMessageHandler.can_handle(&dump));

        let mut mixed = identity_reply_message();
        mixed[1..7].copy_from_slice(&program_dump_header());
        assert!(!(IdentityReplyMessageHandler.can_handle(&mixed) && ProgramDumpMessageHandler.can_handle(&mixed)));
    }

    #[test]
    fn hex_dump() {
        assert_eq!(to_hex(&[0xF0, 0x42, 0x07, 0xF7]), "F0 42 07 F7");
        assert_eq!(to_hex(&[]), "");
    }
}
