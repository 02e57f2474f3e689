//! Domain model (ids, service names, messages, qos, errors).

pub mod errors;
pub mod ids;
pub mod message;
pub mod qos;
pub mod service_name;

pub use self::errors::{
    CallError, DispatchError, EndpointError, HandlerError, NodeError, RegistrationError, TransportError,
    TransportSendError,
};
pub use self::ids::{ClientGid, CorrelationId};
pub use self::message::{RawRequest, RawResponse, RequestHeader};
pub use self::qos::{History, InvalidQos, QosProfile, Reliability};
pub use self::service_name::{InvalidServiceName, ServiceName};
