//! Routing intent for cluster commands.
//!
//! A [`Route`] tells the engine which node(s) should receive a command. The
//! engine owns topology, so routes only carry intent: a slot, a key, an
//! address or a node group. `None` everywhere means "let the engine pick".
//!
//! Routes cross the boundary in a small tagged binary format: one tag byte
//! followed by big-endian fields.
//!
//! | tag | variant      | fields                            |
//! |-----|--------------|-----------------------------------|
//! | 0   | AllNodes     |                                   |
//! | 1   | AllPrimaries |                                   |
//! | 2   | AllReplicas  |                                   |
//! | 3   | Random       |                                   |
//! | 4   | SlotId       | slot_type: u8, slot_id: i32       |
//! | 5   | SlotKey      | slot_type: u8, len: u32, key      |
//! | 6   | ByAddress    | port: u16, len: u32, host (UTF-8) |

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::proto::error::{Error, Result};

/// Number of hash slots in a cluster.
pub const SLOT_COUNT: u16 = 16384;

const TAG_ALL_NODES: u8 = 0;
const TAG_ALL_PRIMARIES: u8 = 1;
const TAG_ALL_REPLICAS: u8 = 2;
const TAG_RANDOM: u8 = 3;
const TAG_SLOT_ID: u8 = 4;
const TAG_SLOT_KEY: u8 = 5;
const TAG_BY_ADDRESS: u8 = 6;

/// Which node of a shard a slot route targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SlotType {
    /// The shard's primary.
    #[default]
    Primary,
    /// One of the shard's replicas.
    Replica,
}

impl SlotType {
    fn to_wire(self) -> u8 {
        match self {
            SlotType::Primary => 0,
            SlotType::Replica => 1,
        }
    }

    fn from_wire(value: u8) -> Result<Self> {
        match value {
            0 => Ok(SlotType::Primary),
            1 => Ok(SlotType::Replica),
            other => Err(malformed(format!("unknown slot type {other}"))),
        }
    }
}

/// Where a command should be sent in a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Route {
    /// Every node in the cluster.
    AllNodes,
    /// Every primary.
    AllPrimaries,
    /// Every replica.
    AllReplicas,
    /// Any single node.
    Random,
    /// The node serving a slot.
    SlotId {
        /// Primary or replica of the slot's shard.
        slot_type: SlotType,
        /// Slot number (0-16383).
        slot_id: i32,
    },
    /// The node serving the slot a key hashes to.
    SlotKey {
        /// Primary or replica of the slot's shard.
        slot_type: SlotType,
        /// The key; the engine hashes it.
        key: String,
    },
    /// A node by address.
    ByAddress {
        /// Host name or IP.
        host: String,
        /// Port number.
        port: u16,
    },
}

impl Route {
    /// Parses a combined `host:port` string into a [`Route::ByAddress`].
    ///
    /// The string must contain exactly one colon between a non-empty host
    /// and a base-10 port.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] for any other shape.
    ///
    /// # Example
    ///
    /// ```
    /// use muxis_bridge::Route;
    ///
    /// let route = Route::by_address("host:1234").unwrap();
    /// assert_eq!(route, Route::ByAddress { host: "host".into(), port: 1234 });
    /// assert!(Route::by_address("host:1234:5678").is_err());
    /// ```
    pub fn by_address(address: &str) -> Result<Self> {
        let (host, port) = parse_address(address)?;
        Ok(Route::ByAddress { host, port })
    }

    /// Returns `true` if this route may fan out to more than one node.
    pub fn is_multi_node(&self) -> bool {
        matches!(
            self,
            Route::AllNodes | Route::AllPrimaries | Route::AllReplicas
        )
    }

    /// Encodes an optional route for the engine.
    ///
    /// `None` in means `None` out: the engine chooses the destination.
    /// Never performs I/O.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for a slot id outside `0..16384`.
    pub fn encode(route: Option<&Route>) -> Result<Option<Bytes>> {
        route.map(Route::to_bytes).transpose()
    }

    /// Encodes this route into its wire form.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(8);
        match self {
            Route::AllNodes => buf.put_u8(TAG_ALL_NODES),
            Route::AllPrimaries => buf.put_u8(TAG_ALL_PRIMARIES),
            Route::AllReplicas => buf.put_u8(TAG_ALL_REPLICAS),
            Route::Random => buf.put_u8(TAG_RANDOM),
            Route::SlotId { slot_type, slot_id } => {
                if !(0..i32::from(SLOT_COUNT)).contains(slot_id) {
                    return Err(Error::InvalidArgument {
                        message: format!("slot id {slot_id} out of range 0..{SLOT_COUNT}"),
                    });
                }
                buf.put_u8(TAG_SLOT_ID);
                buf.put_u8(slot_type.to_wire());
                buf.put_i32(*slot_id);
            }
            Route::SlotKey { slot_type, key } => {
                buf.put_u8(TAG_SLOT_KEY);
                buf.put_u8(slot_type.to_wire());
                put_str(&mut buf, key)?;
            }
            Route::ByAddress { host, port } => {
                buf.put_u8(TAG_BY_ADDRESS);
                buf.put_u16(*port);
                put_str(&mut buf, host)?;
            }
        }
        Ok(buf.freeze())
    }

    /// Decodes a route from its wire form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the bytes are not a well-formed route.
    pub fn decode(mut data: &[u8]) -> Result<Self> {
        if !data.has_remaining() {
            return Err(malformed("empty route"));
        }
        let route = match data.get_u8() {
            TAG_ALL_NODES => Route::AllNodes,
            TAG_ALL_PRIMARIES => Route::AllPrimaries,
            TAG_ALL_REPLICAS => Route::AllReplicas,
            TAG_RANDOM => Route::Random,
            TAG_SLOT_ID => {
                need(&data, 5)?;
                let slot_type = SlotType::from_wire(data.get_u8())?;
                let slot_id = data.get_i32();
                if !(0..i32::from(SLOT_COUNT)).contains(&slot_id) {
                    return Err(malformed(format!("slot id {slot_id} out of range 0..{SLOT_COUNT}")));
                }
                Route::SlotId { slot_type, slot_id }
            }
            TAG_SLOT_KEY => {
                need(&data, 1)?;
                let slot_type = SlotType::from_wire(data.get_u8())?;
                Route::SlotKey {
                    slot_type,
                    key: get_str(&mut data)?,
                }
            }
            TAG_BY_ADDRESS => {
                need(&data, 2)?;
                let port = data.get_u16();
                Route::ByAddress {
                    host: get_str(&mut data)?,
                    port,
                }
            }
            other => return Err(malformed(format!("unknown route tag {other}"))),
        };
        if data.has_remaining() {
            return Err(malformed("trailing bytes after route"));
        }
        Ok(route)
    }
}

/// A route that always resolves to exactly one node.
///
/// Required where fan-out makes no sense, such as the target of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SingleNodeRoute {
    /// Any single node.
    Random,
    /// The node serving a slot.
    SlotId {
        /// Primary or replica of the slot's shard.
        slot_type: SlotType,
        /// Slot number (0-16383).
        slot_id: i32,
    },
    /// The node serving the slot a key hashes to.
    SlotKey {
        /// Primary or replica of the slot's shard.
        slot_type: SlotType,
        /// The key; the engine hashes it.
        key: String,
    },
    /// A node by address.
    ByAddress {
        /// Host name or IP.
        host: String,
        /// Port number.
        port: u16,
    },
}

impl SingleNodeRoute {
    /// Parses a combined `host:port` string, with the same rules as
    /// [`Route::by_address`].
    pub fn by_address(address: &str) -> Result<Self> {
        let (host, port) = parse_address(address)?;
        Ok(SingleNodeRoute::ByAddress { host, port })
    }
}

impl From<SingleNodeRoute> for Route {
    fn from(route: SingleNodeRoute) -> Self {
        match route {
            SingleNodeRoute::Random => Route::Random,
            SingleNodeRoute::SlotId { slot_type, slot_id } => Route::SlotId { slot_type, slot_id },
            SingleNodeRoute::SlotKey { slot_type, key } => Route::SlotKey { slot_type, key },
            SingleNodeRoute::ByAddress { host, port } => Route::ByAddress { host, port },
        }
    }
}

impl TryFrom<Route> for SingleNodeRoute {
    type Error = Error;

    fn try_from(route: Route) -> Result<Self> {
        match route {
            Route::Random => Ok(SingleNodeRoute::Random),
            Route::SlotId { slot_type, slot_id } => Ok(SingleNodeRoute::SlotId { slot_type, slot_id }),
            Route::SlotKey { slot_type, key } => Ok(SingleNodeRoute::SlotKey { slot_type, key }),
            Route::ByAddress { host, port } => Ok(SingleNodeRoute::ByAddress { host, port }),
            multi => Err(Error::InvalidArgument {
                message: format!("{multi:?} targets multiple nodes; a single-node route is required"),
            }),
        }
    }
}

/// Splits `host:port`; exactly one colon, non-empty host, numeric port.
fn parse_address(address: &str) -> Result<(String, u16)> {
    let invalid = || Error::InvalidAddress {
        address: address.to_string(),
    };

    let mut parts = address.split(':');
    let (host, port) = match (parts.next(), parts.next(), parts.next()) {
        (Some(host), Some(port), None) => (host, port),
        _ => return Err(invalid()),
    };
    if host.is_empty() || port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let port = port.parse::<u16>().map_err(|_| invalid())?;
    Ok((host.to_string(), port))
}

fn put_str(buf: &mut BytesMut, value: &str) -> Result<()> {
    let len = u32::try_from(value.len()).map_err(|_| Error::InvalidArgument {
        message: "route string too long".to_string(),
    })?;
    buf.put_u32(len);
    buf.put_slice(value.as_bytes());
    Ok(())
}

fn get_str(data: &mut &[u8]) -> Result<String> {
    need(data, 4)?;
    let len = data.get_u32() as usize;
    need(data, len)?;
    let value = std::str::from_utf8(&data[..len])
        .map_err(|_| malformed("route string is not UTF-8"))?
        .to_string();
    data.advance(len);
    Ok(value)
}

fn need(data: &[u8], len: usize) -> Result<()> {
    if data.len() < len {
        return Err(malformed("truncated route"));
    }
    Ok(())
}

fn malformed(message: impl Into<String>) -> Error {
    Error::Protocol {
        message: message.into(),
    }
}
