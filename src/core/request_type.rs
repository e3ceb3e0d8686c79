use crate::proto::error::Error;

macro_rules! request_types {
    ($($(#[$doc:meta])* $name:ident = $code:literal,)+) => {
        /// Operation identifiers understood by the engine.
        ///
        /// The discriminants are the engine's numeric codes and cross the
        /// boundary as-is. `InvalidRequest` (0) is deliberately absent: it is
        /// never a valid operation.
        #[repr(u32)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[non_exhaustive]
        pub enum RequestType {
            $($(#[$doc])* $name = $code,)+
        }

        impl RequestType {
            /// Returns the engine code for this operation.
            #[inline]
            pub fn code(self) -> u32 {
                self as u32
            }

            /// Returns the operation name, for logging.
            pub fn name(self) -> &'static str {
                match self {
                    $(RequestType::$name => stringify!($name),)+
                }
            }
        }

        impl TryFrom<u32> for RequestType {
            type Error = Error;

            fn try_from(code: u32) -> Result<Self, Self::Error> {
                match code {
                    $($code => Ok(RequestType::$name),)+
                    _ => Err(Error::UnsupportedOperation { code }),
                }
            }
        }
    };
}

request_types! {
    /// A command whose arguments, including the name, are all user supplied.
    CustomCommand = 1,
    /// `CLUSTER INFO`.
    ClusterInfo = 213,
    /// `CLUSTER NODES`.
    ClusterNodes = 219,
    /// `CLUSTER SLOTS`.
    ClusterSlots = 228,
    /// `AUTH`.
    Auth = 301,
    /// `CLIENT GETNAME`.
    ClientGetName = 303,
    /// `CLIENT ID`.
    ClientId = 305,
    /// `CLIENT SETNAME`.
    ClientSetName = 315,
    /// `ECHO`.
    Echo = 320,
    /// `PING`.
    Ping = 322,
    /// `SELECT`.
    Select = 325,
    /// `COPY`.
    Copy = 401,
    /// `DEL`.
    Del = 402,
    /// `EXISTS`.
    Exists = 404,
    Expire = 405,
    Keys = 408,
    Persist = 415,
    PTTL = 419,
    RandomKey = 420,
    Rename = 421,
    Scan = 424,
    Touch = 427,
    TTL = 428,
    Type = 429,
    Unlink = 430,
    HDel = 601,
    HGet = 603,
    HGetAll = 604,
    HLen = 608,
    HSet = 613,
    LLen = 808,
    LPop = 811,
    LPush = 813,
    LRange = 815,
    RPop = 819,
    RPush = 821,
    Publish = 902,
    Eval = 1001,
    EvalSha = 1003,
    ScriptLoad = 1019,
    ConfigGet = 1122,
    ConfigSet = 1125,
    DBSize = 1126,
    FlushAll = 1128,
    FlushDB = 1129,
    Info = 1130,
    LastSave = 1131,
    Lolwut = 1138,
    /// `TIME`.
    Time = 1162,
    /// `SADD`.
    SAdd = 1201,
    /// `SCARD`.
    SCard = 1202,
    /// `SISMEMBER`.
    SIsMember = 1208,
    /// `SMEMBERS`.
    SMembers = 1209,
    /// `SREM`.
    SRem = 1214,
    /// `ZADD`.
    ZAdd = 1304,
    /// `ZCARD`.
    ZCard = 1305,
    /// `ZRANGE`.
    ZRange = 1319,
    /// `ZREM`.
    ZRem = 1324,
    /// `ZSCORE`.
    ZScore = 1333,
    /// `XADD`.
    XAdd = 1402,
    /// `XLEN`.
    XLen = 1414,
    /// `XRANGE`.
    XRange = 1416,
    /// `APPEND`.
    Append = 1501,
    /// `DECR`.
    Decr = 1502,
    /// `DECRBY`.
    DecrBy = 1503,
    /// `GET`.
    Get = 1504,
    /// `GETDEL`.
    GetDel = 1505,
    /// `GETRANGE`.
    GetRange = 1507,
    /// `INCR`.
    Incr = 1509,
    /// `INCRBY`.
    IncrBy = 1510,
    /// `MGET`.
    MGet = 1513,
    /// `MSET`.
    MSet = 1514,
    /// `SET`.
    Set = 1517,
    /// `SETRANGE`.
    SetRange = 1520,
    /// `STRLEN`.
    Strlen = 1521,
    /// `DISCARD`.
    Discard = 1601,
    /// Commit marker of an atomic batch.
    Exec = 1602,
    /// Begin marker of an atomic batch.
    Multi = 1603,
    /// `UNWATCH`.
    UnWatch = 1604,
    /// `WATCH`.
    Watch = 1605,
}
