use hickory_proto::op::{Message, MessageType, Query, ResponseCode};
use hickory_proto::rr::{Name, RecordType};

use crate::error::{CodecError, QueryError};

/// Transaction id used for DoH queries; correlation is done by the HTTP stream.
pub const DOH_TXID: u16 = 0;

/// Largest DNS message carried over UDP, EDNS-extended.
pub const MAX_UDP_MESSAGE: usize = 4096;

/// DNS response information extracted from a parsed message
#[derive(Debug, Clone)]
pub struct DnsResponse {
	pub id: u16,
	pub message_type: MessageType,
	pub response_code: ResponseCode,
	pub truncated: bool,
	/// Record type of each answer, in order
	pub answer_types: Vec<RecordType>,
}

impl DnsResponse {
	/// Accept only NOERROR responses; anything else is a failed query.
	pub fn check(&self) -> Result<(), QueryError> {
		if self.message_type == MessageType::Response
			&& self.response_code == ResponseCode::NoError
		{
			Ok(())
		} else {
			Err(QueryError::BadMessage {
				response_code: self.response_code,
				message_type: self.message_type,
			})
		}
	}

	/// Like [`check`](Self::check), but also require a complete answer
	/// section holding at least one record of `record_type`.
	pub fn check_answer(&self, record_type: RecordType) -> Result<(), QueryError> {
		self.check()?;
		if self.truncated {
			return Err(QueryError::Truncated);
		}
		if !self.answer_types.contains(&record_type) {
			return Err(QueryError::NoData(record_type));
		}
		Ok(())
	}
}

/// Build a DNS query message for the given name and record type.
///
/// Sets recursion desired and a single question.
/// Returns the serialized query bytes.
pub fn build_query(
	domain: &str,
	record_type: RecordType,
	txid: u16,
) -> Result<Vec<u8>, CodecError> {
	let name = Name::from_ascii(domain)
		.map_err(|e| CodecError::InvalidName {
			name: domain.to_string(),
			reason: e.to_string(),
		})?;

	let mut message = Message::new();
	message.set_id(txid);
	message.set_recursion_desired(true);
	message.add_query(Query::query(name, record_type));

	message.to_vec()
		.map_err(|e| CodecError::Encode(e.to_string()))
}

/// Encode a query for carriage over DoH (transaction id 0).
pub fn encode_query(domain: &str, record_type: RecordType) -> Result<Vec<u8>, CodecError> {
	build_query(domain, record_type, DOH_TXID)
}

/// Decode a DNS message, extracting its id, type and rcode.
pub fn decode_response(bytes: &[u8]) -> Result<DnsResponse, CodecError> {
	let message = Message::from_vec(bytes)
		.map_err(|e| CodecError::Decode(e.to_string()))?;

	Ok(DnsResponse {
		id: message.id(),
		message_type: message.message_type(),
		response_code: message.response_code(),
		truncated: message.truncated(),
		answer_types: message.answers().iter().map(|r| r.record_type()).collect(),
	})
}

/// A SERVFAIL answer to `query`, keeping its id and question.
pub fn servfail_for(query: &[u8]) -> Result<Vec<u8>, CodecError> {
	let query = Message::from_vec(query)
		.map_err(|e| CodecError::Decode(e.to_string()))?;

	let mut response = Message::new();
	response.set_id(query.id());
	response.set_message_type(MessageType::Response);
	response.set_op_code(query.op_code());
	response.set_recursion_desired(query.recursion_desired());
	response.set_recursion_available(true);
	response.set_response_code(ResponseCode::ServFail);
	response.add_queries(query.queries().iter().cloned());
	response.to_vec()
		.map_err(|e| CodecError::Encode(e.to_string()))
}

/// Fit a response into `limit` bytes for UDP.
///
/// Oversized messages keep their header and question, drop every record
/// and set TC so the client knows the answer did not fit.
pub fn fit_udp(response: &[u8], limit: usize) -> Result<Vec<u8>, CodecError> {
	if response.len() <= limit {
		return Ok(response.to_vec());
	}
	let full = Message::from_vec(response)
		.map_err(|e| CodecError::Decode(e.to_string()))?;

	let mut truncated = Message::new();
	truncated.set_id(full.id());
	truncated.set_message_type(full.message_type());
	truncated.set_op_code(full.op_code());
	truncated.set_recursion_desired(full.recursion_desired());
	truncated.set_recursion_available(full.recursion_available());
	truncated.set_response_code(full.response_code());
	truncated.set_truncated(true);
	truncated.add_queries(full.queries().iter().cloned());
	truncated.to_vec()
		.map_err(|e| CodecError::Encode(e.to_string()))
}
