//! Wire schema of the protocol.
//!
//! The messages are declared with `prost` derives so the encoding is the
//! standard protobuf one; the layout mirrors `pbft.v1`:
//!
//! ```text
//! message Request  { string operation = 1; string client = 2; uint64 timestamp = 3; }
//! message PbftMsg  { MessageType type = 1; uint64 view = 2; uint64 sequence = 3;
//!                    string sender = 4; Request request = 5; bytes request_digest = 6; }
//! message Envelope { string protocol_id = 1; bytes payload = 2; }
//! ```

pub mod pbft {
    pub mod v1 {
        /// Client-submitted operation.
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct Request {
            #[prost(string, tag = "1")]
            pub operation: ::prost::alloc::string::String,
            #[prost(string, tag = "2")]
            pub client: ::prost::alloc::string::String,
            #[prost(uint64, tag = "3")]
            pub timestamp: u64,
        }

        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
        #[repr(i32)]
        pub enum MessageType {
            Unspecified = 0,
            Request = 1,
            Preprepare = 2,
            Prepare = 3,
            Commit = 4,
        }

        /// Encoded protocol message. Which optional fields must be present is
        /// decided by `type`, never by which fields happen to be set.
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct PbftMsg {
            #[prost(enumeration = "MessageType", tag = "1")]
            pub r#type: i32,
            #[prost(uint64, tag = "2")]
            pub view: u64,
            #[prost(uint64, tag = "3")]
            pub sequence: u64,
            #[prost(string, tag = "4")]
            pub sender: ::prost::alloc::string::String,
            #[prost(message, optional, tag = "5")]
            pub request: ::core::option::Option<Request>,
            #[prost(bytes = "vec", tag = "6")]
            pub request_digest: ::prost::alloc::vec::Vec<u8>,
        }

        /// Generic transport payload carrying an encoded [`PbftMsg`].
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct Envelope {
            #[prost(string, tag = "1")]
            pub protocol_id: ::prost::alloc::string::String,
            #[prost(bytes = "vec", tag = "2")]
            pub payload: ::prost::alloc::vec::Vec<u8>,
        }
    }
}
