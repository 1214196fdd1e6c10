/// A single membership protocol message.
///
/// Requests and responses share this shape; a response carries the
/// `sequence_number` of the request it answers.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GossipMessage {
    #[prost(enumeration = "MessageType", tag = "1")]
    pub r#type: i32,
    /// The node which sent this message.
    #[prost(message, optional, tag = "2")]
    pub sender: ::core::option::Option<NodeInfo>,
    /// The node this message is about, for probe and rumor messages.
    #[prost(message, optional, tag = "3")]
    pub subject: ::core::option::Option<NodeInfo>,
    /// Piggybacked membership entries, or the full member list for
    /// JOIN_RESPONSE and SYNC.
    #[prost(message, repeated, tag = "4")]
    pub members: ::prost::alloc::vec::Vec<NodeInfo>,
    /// Correlates responses to requests on a shared connection.
    #[prost(uint64, tag = "5")]
    pub sequence_number: u64,
}
/// A cluster member as carried in gossip messages.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodeInfo {
    #[prost(string, tag = "1")]
    pub id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub address: ::prost::alloc::string::String,
    #[prost(uint32, tag = "3")]
    pub port: u32,
    #[prost(enumeration = "NodeStatus", tag = "4")]
    pub status: i32,
    #[prost(uint64, tag = "5")]
    pub incarnation: u64,
    /// Observation time at the sender, in milliseconds since the Unix epoch.
    #[prost(int64, tag = "6")]
    pub timestamp: i64,
}
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
)]
#[repr(i32)]
pub enum MessageType {
    Ping = 0,
    Ack = 1,
    PingReq = 2,
    Suspect = 3,
    Alive = 4,
    Confirm = 5,
    Join = 6,
    JoinResponse = 7,
    Leave = 8,
    Sync = 9,
}
impl MessageType {
    /// String value of the enum field names used in the ProtoBuf definition.
    ///
    /// The values are not transformed in any way and thus are considered stable
    /// (if the ProtoBuf definition does not change) and safe for programmatic use.
    pub fn as_str_name(&self) -> &'static str {
        match self {
            MessageType::Ping => "PING",
            MessageType::Ack => "ACK",
            MessageType::PingReq => "PING_REQ",
            MessageType::Suspect => "SUSPECT",
            MessageType::Alive => "ALIVE",
            MessageType::Confirm => "CONFIRM",
            MessageType::Join => "JOIN",
            MessageType::JoinResponse => "JOIN_RESPONSE",
            MessageType::Leave => "LEAVE",
            MessageType::Sync => "SYNC",
        }
    }
    /// Creates an enum from field names used in the ProtoBuf definition.
    pub fn from_str_name(value: &str) -> ::core::option::Option<Self> {
        match value {
            "PING" => Some(Self::Ping),
            "ACK" => Some(Self::Ack),
            "PING_REQ" => Some(Self::PingReq),
            "SUSPECT" => Some(Self::Suspect),
            "ALIVE" => Some(Self::Alive),
            "CONFIRM" => Some(Self::Confirm),
            "JOIN" => Some(Self::Join),
            "JOIN_RESPONSE" => Some(Self::JoinResponse),
            "LEAVE" => Some(Self::Leave),
            "SYNC" => Some(Self::Sync),
            _ => None,
        }
    }
}
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
)]
#[repr(i32)]
pub enum NodeStatus {
    Alive = 0,
    Suspected = 1,
    Down = 2,
    Leaving = 3,
    Left = 4,
}
impl NodeStatus {
    /// String value of the enum field names used in the ProtoBuf definition.
    ///
    /// The values are not transformed in any way and thus are considered stable
    /// (if the ProtoBuf definition does not change) and safe for programmatic use.
    pub fn as_str_name(&self) -> &'static str {
        match self {
            NodeStatus::Alive => "ALIVE",
            NodeStatus::Suspected => "SUSPECTED",
            NodeStatus::Down => "DOWN",
            NodeStatus::Leaving => "LEAVING",
            NodeStatus::Left => "LEFT",
        }
    }
    /// Creates an enum from field names used in the ProtoBuf definition.
    pub fn from_str_name(value: &str) -> ::core::option::Option<Self> {
        match value {
            "ALIVE" => Some(Self::Alive),
            "SUSPECTED" => Some(Self::Suspected),
            "DOWN" => Some(Self::Down),
            "LEAVING" => Some(Self::Leaving),
            "LEFT" => Some(Self::Left),
            _ => None,
        }
    }
}
