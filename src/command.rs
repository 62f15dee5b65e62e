//! The wire command set.
//!
//! A request frame is `u8 command || u64-le database id || statement`. The
//! command byte is a stable ordinal: values already assigned never move, and
//! new commands append to the end of the enumeration. The statement that
//! follows the database id is interpreted by the target database (see
//! [crate::store::Database]); its grammar is not part of the frame contract.

/// A command discriminant as carried on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    Select = 0,
    Del = 1,
    Exists = 2,
    Move = 3,
    Rename = 4,
    RenameNx = 5,
    Type = 6,
    Set = 7,
    Get = 8,
    GetRange = 9,
    GetBit = 10,
    SetBit = 11,
    MGet = 12,
    SetNx = 13,
    SetRange = 14,
    StrLen = 15,
    MSet = 16,
    MSetNx = 17,
    Incr = 18,
    IncrBy = 19,
    Decr = 20,
    DecrBy = 21,
    Append = 22,
    HDel = 23,
    HExists = 24,
    HGet = 25,
    HGetAll = 26,
    HIncrBy = 27,
    HKeys = 28,
    HLen = 29,
    HSet = 30,
    HVals = 31,
    LIndex = 32,
    LLen = 33,
    LPop = 34,
    LPush = 35,
    LPushX = 36,
    Dump = 37,
}

impl Command {
    /// All commands, in ordinal order.
    pub const ALL: [Command; 38] = [
        Command::Select,
        Command::Del,
        Command::Exists,
        Command::Move,
        Command::Rename,
        Command::RenameNx,
        Command::Type,
        Command::Set,
        Command::Get,
        Command::GetRange,
        Command::GetBit,
        Command::SetBit,
        Command::MGet,
        Command::SetNx,
        Command::SetRange,
        Command::StrLen,
        Command::MSet,
        Command::MSetNx,
        Command::Incr,
        Command::IncrBy,
        Command::Decr,
        Command::DecrBy,
        Command::Append,
        Command::HDel,
        Command::HExists,
        Command::HGet,
        Command::HGetAll,
        Command::HIncrBy,
        Command::HKeys,
        Command::HLen,
        Command::HSet,
        Command::HVals,
        Command::LIndex,
        Command::LLen,
        Command::LPop,
        Command::LPush,
        Command::LPushX,
        Command::Dump,
    ];

    /// Returns the wire ordinal of the command.
    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// Decodes a wire ordinal.
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    /// Whether executing the command may change database state.
    ///
    /// Mutating commands are recorded to the command log after they execute;
    /// `SELECT` and read-only commands are not.
    pub fn mutates(&self) -> bool {
        match self {
            Command::Del
            | Command::Move
            | Command::Rename
            | Command::RenameNx
            | Command::Set
            | Command::SetBit
            | Command::SetNx
            | Command::SetRange
            | Command::MSet
            | Command::MSetNx
            | Command::Incr
            | Command::IncrBy
            | Command::Decr
            | Command::DecrBy
            | Command::Append
            | Command::HDel
            | Command::HIncrBy
            | Command::HSet
            | Command::LPop
            | Command::LPush
            | Command::LPushX => true,
            Command::Select
            | Command::Exists
            | Command::Type
            | Command::Get
            | Command::GetRange
            | Command::GetBit
            | Command::MGet
            | Command::StrLen
            | Command::HExists
            | Command::HGet
            | Command::HGetAll
            | Command::HKeys
            | Command::HLen
            | Command::HVals
            | Command::LIndex
            | Command::LLen
            | Command::Dump => false,
        }
    }

    /// Returns the command name.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Select => "SELECT",
            Command::Del => "DEL",
            Command::Exists => "EXISTS",
            Command::Move => "MOVE",
            Command::Rename => "RENAME",
            Command::RenameNx => "RENAMENX",
            Command::Type => "TYPE",
            Command::Set => "SET",
            Command::Get => "GET",
            Command::GetRange => "GETRANGE",
            Command::GetBit => "GETBIT",
            Command::SetBit => "SETBIT",
            Command::MGet => "MGET",
            Command::SetNx => "SETNX",
            Command::SetRange => "SETRANGE",
            Command::StrLen => "STRLEN",
            Command::MSet => "MSET",
            Command::MSetNx => "MSETNX",
            Command::Incr => "INCR",
            Command::IncrBy => "INCRBY",
            Command::Decr => "DECR",
            Command::DecrBy => "DECRBY",
            Command::Append => "APPEND",
            Command::HDel => "HDEL",
            Command::HExists => "HEXISTS",
            Command::HGet => "HGET",
            Command::HGetAll => "HGETALL",
            Command::HIncrBy => "HINCRBY",
            Command::HKeys => "HKEYS",
            Command::HLen => "HLEN",
            Command::HSet => "HSET",
            Command::HVals => "HVALS",
            Command::LIndex => "LINDEX",
            Command::LLen => "LLEN",
            Command::LPop => "LPOP",
            Command::LPush => "LPUSH",
            Command::LPushX => "LPUSHX",
            Command::Dump => "DUMP",
        }
    }

    /// Parses a command name (case-insensitive).
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .find(|command| command.name().eq_ignore_ascii_case(name))
            .copied()
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Builds a request frame from its parts.
pub fn frame(command: Command, database: u64, statement: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(1 + 8 + statement.len());
    frame.push(command.code());
    frame.extend_from_slice(&database.to_le_bytes());
    frame.extend_from_slice(statement);
    frame
}
