//! Hub protocol packets.
//!
//! Both directions can be encoded and decoded: the connector encodes
//! `OutboundPacket` and decodes `InboundPacket`, a hub (or a test double)
//! does the opposite.

use crate::buffer::{WireReader, WireWriter};
use crate::error::WireResult;
use hublink_core::{Boundary, TradeId, TradeRequest, TradeType};
use tracing::{debug, warn};

// ============================================================================
// Outbound (connector -> hub)
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum OutboundPacket {
    RegisterTicksProvider {
        key: String,
    },
    RegisterTradeConnector {
        key: String,
        balance: f64,
        equity: f64,
    },
    CurrentBalance {
        balance: f64,
    },
    CurrentEquity {
        equity: f64,
    },
    OnTick {
        bid: f64,
        ask: f64,
    },
    NewId {
        id: TradeId,
    },
    OpenedResponse {
        id: TradeId,
    },
    ExternallyClosed {
        id: TradeId,
    },
    MessageAboutTrade {
        id: TradeId,
        text: String,
    },
    FreeTrade {
        id: TradeId,
    },
}

impl OutboundPacket {
    /// Name written at the head of the payload.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RegisterTicksProvider { .. } => "RegisterTicksProvider",
            Self::RegisterTradeConnector { .. } => "RegisterTradeConnector",
            Self::CurrentBalance { .. } => "CurrentBalance",
            Self::CurrentEquity { .. } => "CurrentEquity",
            Self::OnTick { .. } => "OnTick",
            Self::NewId { .. } => "NewId",
            Self::OpenedResponse { .. } => "OpenedResponse",
            Self::ExternallyClosed { .. } => "ExternallyClosed",
            Self::MessageAboutTrade { .. } => "MessageAboutTrade",
            Self::FreeTrade { .. } => "FreeTrade",
        }
    }

    /// Payload bytes, without the frame header.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = WireWriter::new();
        w.put_string(self.name());

        match self {
            Self::RegisterTicksProvider { key } => {
                w.put_string(key);
            }
            Self::RegisterTradeConnector {
                key,
                balance,
                equity,
            } => {
                w.put_string(key).put_double(*balance).put_double(*equity);
            }
            Self::CurrentBalance { balance } => {
                w.put_double(*balance);
            }
            Self::CurrentEquity { equity } => {
                w.put_double(*equity);
            }
            Self::OnTick { bid, ask } => {
                w.put_double(*bid).put_double(*ask);
            }
            Self::NewId { id }
            | Self::OpenedResponse { id }
            | Self::ExternallyClosed { id }
            | Self::FreeTrade { id } => {
                w.put_long(*id);
            }
            Self::MessageAboutTrade { id, text } => {
                w.put_long(*id).put_string(text);
            }
        }

        w.into_bytes()
    }

    /// Decode a payload. Unknown packet names yield `Ok(None)`.
    pub fn decode(payload: &[u8]) -> WireResult<Option<Self>> {
        let mut r = WireReader::new(payload);
        let name = r.next_string()?;

        let packet = match name.as_str() {
            "RegisterTicksProvider" => Self::RegisterTicksProvider {
                key: r.next_string()?,
            },
            "RegisterTradeConnector" => Self::RegisterTradeConnector {
                key: r.next_string()?,
                balance: r.next_double()?,
                equity: r.next_double()?,
            },
            "CurrentBalance" => Self::CurrentBalance {
                balance: r.next_double()?,
            },
            "CurrentEquity" => Self::CurrentEquity {
                equity: r.next_double()?,
            },
            "OnTick" => Self::OnTick {
                bid: r.next_double()?,
                ask: r.next_double()?,
            },
            "NewId" => Self::NewId { id: r.next_long()? },
            "OpenedResponse" => Self::OpenedResponse { id: r.next_long()? },
            "ExternallyClosed" => Self::ExternallyClosed { id: r.next_long()? },
            "MessageAboutTrade" => Self::MessageAboutTrade {
                id: r.next_long()?,
                text: r.next_string()?,
            },
            "FreeTrade" => Self::FreeTrade { id: r.next_long()? },
            other => {
                debug!(name = other, "Ignoring unknown outbound packet");
                return Ok(None);
            }
        };

        Ok(Some(packet))
    }
}

// ============================================================================
// Inbound (hub -> connector)
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum InboundPacket {
    RequestNewId,
    OpenTrade {
        id: TradeId,
        request: TradeRequest,
        stop: Boundary,
        take_profit: Option<Boundary>,
    },
    CloseRequest {
        id: TradeId,
    },
    UpdateStopRequest {
        id: TradeId,
        stop: Boundary,
    },
    UpdateTakeProfitRequest {
        id: TradeId,
        take_profit: Option<Boundary>,
    },
}

impl InboundPacket {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RequestNewId => "RequestNewId",
            Self::OpenTrade { .. } => "OpenTrade",
            Self::CloseRequest { .. } => "CloseRequest",
            Self::UpdateStopRequest { .. } => "UpdateStopRequest",
            Self::UpdateTakeProfitRequest { .. } => "UpdateTakeProfitRequest",
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = WireWriter::new();
        w.put_string(self.name());

        match self {
            Self::RequestNewId => {}
            Self::OpenTrade {
                id,
                request,
                stop,
                take_profit,
            } => {
                w.put_long(*id)
                    .put_double(request.value)
                    .put_string(request.trade_type.as_str())
                    .put_optional_boundary(request.delay)
                    .put_boundary(*stop)
                    .put_optional_boundary(*take_profit);
            }
            Self::CloseRequest { id } => {
                w.put_long(*id);
            }
            Self::UpdateStopRequest { id, stop } => {
                w.put_long(*id).put_boundary(*stop);
            }
            Self::UpdateTakeProfitRequest { id, take_profit } => {
                w.put_long(*id).put_optional_boundary(*take_profit);
            }
        }

        w.into_bytes()
    }

    /// Decode a payload. Unknown packet names yield `Ok(None)` so newer hubs
    /// can add packets without breaking older connectors.
    pub fn decode(payload: &[u8]) -> WireResult<Option<Self>> {
        let mut r = WireReader::new(payload);
        let name = r.next_string()?;

        let packet = match name.as_str() {
            "RequestNewId" => Self::RequestNewId,
            "OpenTrade" => {
                let id = r.next_long()?;
                let value = r.next_double()?;
                let trade_type = read_trade_type(&mut r)?;
                let delay = r.next_optional_boundary()?;
                Self::OpenTrade {
                    id,
                    request: TradeRequest::new(value, trade_type, delay),
                    stop: r.next_boundary()?,
                    take_profit: r.next_optional_boundary()?,
                }
            }
            "CloseRequest" => Self::CloseRequest { id: r.next_long()? },
            "UpdateStopRequest" => Self::UpdateStopRequest {
                id: r.next_long()?,
                stop: r.next_boundary()?,
            },
            "UpdateTakeProfitRequest" => Self::UpdateTakeProfitRequest {
                id: r.next_long()?,
                take_profit: r.next_optional_boundary()?,
            },
            other => {
                debug!(name = other, "Ignoring unknown inbound packet");
                return Ok(None);
            }
        };

        Ok(Some(packet))
    }
}

/// Anything other than "Sell" is a buy.
fn read_trade_type(r: &mut WireReader<'_>) -> WireResult<TradeType> {
    let text = r.next_string()?;
    Ok(text.parse().unwrap_or_else(|_| {
        warn!(trade_type = %text, "Unknown trade type, treating as Buy");
        TradeType::Buy
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outbound_samples() -> Vec<OutboundPacket> {
        vec![
            OutboundPacket::RegisterTicksProvider {
                key: "EURUSD".to_string(),
            },
            OutboundPacket::RegisterTradeConnector {
                key: "acct-1".to_string(),
                balance: 10_000.0,
                equity: 9_876.54,
            },
            OutboundPacket::CurrentBalance { balance: 10_250.5 },
            OutboundPacket::CurrentEquity { equity: 10_100.25 },
            OutboundPacket::OnTick {
                bid: 1.0842,
                ask: 1.0844,
            },
            OutboundPacket::NewId { id: 1 },
            OutboundPacket::OpenedResponse { id: 2 },
            OutboundPacket::ExternallyClosed { id: 3 },
            OutboundPacket::MessageAboutTrade {
                id: 4,
                text: "requote".to_string(),
            },
            OutboundPacket::FreeTrade { id: u64::MAX },
        ]
    }

    #[test]
    fn test_outbound_packets_decode_to_themselves() {
        for packet in outbound_samples() {
            let decoded = OutboundPacket::decode(&packet.encode()).unwrap();
            assert_eq!(decoded, Some(packet));
        }
    }

    fn inbound_samples() -> Vec<InboundPacket> {
        vec![
            InboundPacket::RequestNewId,
            InboundPacket::OpenTrade {
                id: 42,
                request: TradeRequest::new(0.5, TradeType::Sell, Some(Boundary::new(15.0))),
                stop: Boundary::new(1.1),
                take_profit: Some(Boundary::new(1.0)),
            },
            InboundPacket::OpenTrade {
                id: 43,
                request: TradeRequest::new(1.0, TradeType::Buy, None),
                stop: Boundary::new(0.95),
                take_profit: None,
            },
            InboundPacket::CloseRequest { id: 7 },
            InboundPacket::UpdateStopRequest {
                id: 8,
                stop: Boundary::new(1.0825),
            },
            InboundPacket::UpdateTakeProfitRequest {
                id: 9,
                take_profit: Some(Boundary::new(1.2)),
            },
            InboundPacket::UpdateTakeProfitRequest {
                id: 9,
                take_profit: None,
            },
        ]
    }

    #[test]
    fn test_inbound_packets_decode_to_themselves() {
        for packet in inbound_samples() {
            let decoded = InboundPacket::decode(&packet.encode()).unwrap();
            assert_eq!(decoded, Some(packet));
        }
    }

    #[test]
    fn test_new_id_layout() {
        let bytes = OutboundPacket::NewId { id: 258 }.encode();
        let mut expected = vec![0, 0, 0, 5];
        expected.extend_from_slice(b"NewId");
        expected.extend_from_slice(&[0, 0, 0, 0, 0, 0, 1, 2]);
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_unknown_trade_type_is_buy() {
        let mut w = WireWriter::new();
        w.put_string("OpenTrade")
            .put_long(5)
            .put_double(1.0)
            .put_string("Hold")
            .put_bool(false)
            .put_boundary(Boundary::new(2.0))
            .put_bool(false);

        let Some(InboundPacket::OpenTrade { request, .. }) =
            InboundPacket::decode(&w.into_bytes()).unwrap()
        else {
            panic!("expected OpenTrade");
        };
        assert_eq!(request.trade_type, TradeType::Buy);
    }

    #[test]
    fn test_unknown_name_is_ignored() {
        let mut w = WireWriter::new();
        w.put_string("SomethingNew").put_long(1);
        assert_eq!(InboundPacket::decode(&w.clone().into_bytes()).unwrap(), None);
        assert_eq!(OutboundPacket::decode(&w.into_bytes()).unwrap(), None);
    }

    #[test]
    fn test_truncated_packet_is_error() {
        let mut bytes = InboundPacket::CloseRequest { id: 7 }.encode();
        bytes.truncate(bytes.len() - 1);
        assert!(InboundPacket::decode(&bytes).is_err());
    }

    #[test]
    fn test_request_new_id_is_name_only() {
        let bytes = InboundPacket::RequestNewId.encode();
        assert_eq!(bytes.len(), 4 + "RequestNewId".len());
        assert_eq!(
            InboundPacket::decode(&bytes).unwrap(),
            Some(InboundPacket::RequestNewId)
        );
    }
}
