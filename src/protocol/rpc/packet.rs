use crate::sdp_record;
use bytes::Bytes;
use std::collections::HashMap;

sdp_record! {
    /// A call from client to server. Arguments are packed positionally into
    /// `req_payload`.
    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct RequestPacket {
        pub is_one_way: bool,
        pub request_id: u32,
        pub service_name: String,
        pub func_name: String,
        pub req_payload: Bytes,
        /// Milliseconds the client waits for the reply
        pub timeout: u32,
        pub context: HashMap<String, String>,
    }
}

sdp_record! {
    /// The server's answer. `mfw_ret` is `0` on success, otherwise one of
    /// [`status`](super::status); `context` echoes the request's.
    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct ResponsePacket {
        pub mfw_ret: i32,
        pub request_id: u32,
        pub rsp_payload: Bytes,
        pub context: HashMap<String, String>,
    }
}
