use num_enum::{IntoPrimitive, TryFromPrimitive};
use strum_macros::{EnumIter, IntoStaticStr};

/// Числовые идентификаторы команд.
///
/// Значения являются частью протокола и не меняются. Группы:
/// - 1..: системные,
/// - 1000..: каталог,
/// - 2000..: key-value,
/// - 4000..: объектное хранилище,
/// - 6000..: брокер.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive, IntoStaticStr, EnumIter,
)]
#[repr(u16)]
pub enum CommandId {
    Ping = 1,
    SupportedProtocolVersions = 2,
    Login = 100,
    AuthStatus = 101,

    DatabaseGet = 1000,
    CollectionGet = 1010,

    Set = 2000,
    #[strum(serialize = "SetTTL")]
    SetTtl = 2001,
    SetMultiple = 2002,
    #[strum(serialize = "SetMultipleTTL")]
    SetMultipleTtl = 2003,
    SetIfExists = 2004,
    #[strum(serialize = "SetIfExistsTTL")]
    SetIfExistsTtl = 2005,
    SetIfNotExists = 2006,
    #[strum(serialize = "SetIfNotExistsTTL")]
    SetIfNotExistsTtl = 2007,
    Delete = 2020,
    DeleteMultiple = 2021,
    DeleteAll = 2022,
    Exists = 2030,
    Get = 2031,
    GetMultiple = 2032,
    GetAll = 2033,
    #[strum(serialize = "GetTTL")]
    GetTtl = 2034,
    #[strum(serialize = "GetMultipleTTL")]
    GetMultipleTtl = 2035,
    #[strum(serialize = "GetAllTTL")]
    GetAllTtl = 2036,
    Keys = 2037,
    Count = 2038,
    Size = 2039,

    ObjectPut = 4000,
    ObjectGet = 4001,
    ObjectGetMetadata = 4002,
    ObjectDelete = 4003,
    ObjectExists = 4004,
    ObjectCount = 4009,
    ObjectSize = 4010,

    BrokerSubscribe = 6000,
    BrokerSubscribeQueue = 6001,
    BrokerUnsubscribe = 6002,
    BrokerPublish = 6003,
    /// Метка для рассылок на стороне клиента, сервер такую команду не
    /// принимает.
    BrokerMessage = 6004,
}

impl CommandId {
    pub const fn id(self) -> u16 {
        self as u16
    }

    pub fn from_u16(v: u16) -> Option<Self> {
        Self::try_from(v).ok()
    }

    pub fn name(self) -> &'static str {
        self.into()
    }

    /// Команды, которые выполняются без принципала.
    pub fn is_bypass(self) -> bool {
        matches!(
            self,
            Self::Ping | Self::SupportedProtocolVersions | Self::Login | Self::AuthStatus
        )
    }

    /// Команды, изменяющие данные (требуют права записи).
    pub fn is_mutating(self) -> bool {
        matches!(
            self,
            Self::Set
                | Self::SetTtl
                | Self::SetMultiple
                | Self::SetMultipleTtl
                | Self::SetIfExists
                | Self::SetIfExistsTtl
                | Self::SetIfNotExists
                | Self::SetIfNotExistsTtl
                | Self::Delete
                | Self::DeleteMultiple
                | Self::DeleteAll
                | Self::ObjectPut
                | Self::ObjectDelete
                | Self::BrokerPublish
        )
    }
}
