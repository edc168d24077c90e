//! Command bytes of the stream format.
//!
//! A stream is a flat sequence of frames: one command byte, a 4-byte
//! little-endian payload length, then the payload. Create commands carry a
//! full record encoding; `Unregister` carries a bare 16-byte identifier.
//! Unknown command bytes are skippable by construction - the length prefix
//! lets a reader step over payloads it cannot interpret.

/// Stream command bytes
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Create or replace a project record
    CreateProject = 1,
    /// Create or replace a module record
    CreateModule = 2,
    /// Create or replace a type definition
    CreateType = 3,
    /// Create or replace an entity group
    CreateEntityGroup = 4,
    /// Create or replace an entity
    CreateEntity = 5,
    /// Create or replace a script record
    CreateScript = 6,
    /// Create or replace a system record
    CreateSystem = 7,
    /// Evict a record by identifier
    Unregister = 8,
}

impl CommandKind {
    /// Convert a command byte. Unknown bytes are not an error here; the
    /// reader decides between skipping and failing.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(CommandKind::CreateProject),
            2 => Some(CommandKind::CreateModule),
            3 => Some(CommandKind::CreateType),
            4 => Some(CommandKind::CreateEntityGroup),
            5 => Some(CommandKind::CreateEntity),
            6 => Some(CommandKind::CreateScript),
            7 => Some(CommandKind::CreateSystem),
            8 => Some(CommandKind::Unregister),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_bytes_round_trip() {
        for cmd in [
            CommandKind::CreateProject,
            CommandKind::CreateModule,
            CommandKind::CreateType,
            CommandKind::CreateEntityGroup,
            CommandKind::CreateEntity,
            CommandKind::CreateScript,
            CommandKind::CreateSystem,
            CommandKind::Unregister,
        ] {
            assert_eq!(CommandKind::from_u8(cmd as u8), Some(cmd));
        }
        assert_eq!(CommandKind::from_u8(0), None);
        assert_eq!(CommandKind::from_u8(0xff), None);
    }
}
