//! `tokio_util` codec for framed TCP I/O.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::StreamError;
use crate::wire::header::{HEADER_SIZE, WireHeader, checksum};
use crate::wire::message::WireMessage;

/// Length-prefixed codec for [`WireMessage`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct WireCodec;

impl Decoder for WireCodec {
    type Item = WireMessage;
    type Error = StreamError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        let header = WireHeader::decode(&src[..HEADER_SIZE])?;
        let frame_len = header.frame_len();
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        src.advance(HEADER_SIZE);
        let tag = src.split_to(header.tag_len as usize);
        let payload: Bytes = src.split_to(header.payload_len as usize).freeze();

        if checksum(&tag, &payload) != header.checksum {
            return Err(StreamError::Protocol("checksum mismatch".into()));
        }
        let tag = String::from_utf8(tag.to_vec())
            .map_err(|e| StreamError::Protocol(format!("tag is not utf-8: {e}")))?;

        WireMessage::new(header.kind, header.flags, tag, payload).map(Some)
    }
}

impl Encoder<WireMessage> for WireCodec {
    type Error = StreamError;

    fn encode(&mut self, item: WireMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let header = item.header();
        dst.reserve(header.frame_len());
        dst.put_slice(&header.encode());
        dst.put_slice(item.tag().as_bytes());
        dst.put_slice(item.payload());
        Ok(())
    }
}
