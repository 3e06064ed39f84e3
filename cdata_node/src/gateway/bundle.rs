//! ANS-104 data items signed with the server's Ethereum key
//!
//! Binary layout (all integers little-endian):
//!
//! ```text
//! sig type (u16) | signature (65) | owner (65) | target flag [+32] | anchor flag [+32]
//! | tag count (u64) | tag bytes length (u64) | avro tags | data
//! ```
//!
//! The signature is an EIP-191 personal-sign over the SHA-384 deep hash of the
//! item fields; the item id is base64url(sha256(signature)).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha384};

use super::{GatewayError, GatewayResult};
use crate::wallet::ServerWallet;

/// Signature type id for secp256k1 / EIP-191 signers
pub const SIGNATURE_TYPE_ETHEREUM: u16 = 3;
pub const SIGNATURE_LENGTH: usize = 65;
pub const OWNER_LENGTH: usize = 65;

const MAX_TAGS: usize = 128;
const MAX_TAG_NAME_BYTES: usize = 1024;
const MAX_TAG_VALUE_BYTES: usize = 3072;

/// Name/value pair attached to a data item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub value: String,
}

impl Tag {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Zigzag + varint encoding of an Avro `long`
fn write_long(buf: &mut Vec<u8>, value: i64) {
    let mut n = ((value << 1) ^ (value >> 63)) as u64;
    while n & !0x7f != 0 {
        buf.push(((n & 0x7f) as u8) | 0x80);
        n >>= 7;
    }
    buf.push(n as u8);
}

fn read_long(bytes: &[u8], pos: &mut usize) -> GatewayResult<i64> {
    let mut n: u64 = 0;
    let mut shift = 0;
    loop {
        let byte = *bytes
            .get(*pos)
            .ok_or_else(|| GatewayError::InvalidResponse("truncated avro long".to_string()))?;
        *pos += 1;
        n |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
        if shift > 63 {
            return Err(GatewayError::InvalidResponse("avro long overflow".to_string()));
        }
    }
    Ok(((n >> 1) as i64) ^ -((n & 1) as i64))
}

fn write_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    write_long(buf, bytes.len() as i64);
    buf.extend_from_slice(bytes);
}

fn read_bytes<'a>(bytes: &'a [u8], pos: &mut usize) -> GatewayResult<&'a [u8]> {
    let len = read_long(bytes, pos)?;
    if len < 0 {
        return Err(GatewayError::InvalidResponse("negative avro length".to_string()));
    }
    let end = *pos + len as usize;
    let slice = bytes
        .get(*pos..end)
        .ok_or_else(|| GatewayError::InvalidResponse("truncated avro bytes".to_string()))?;
    *pos = end;
    Ok(slice)
}

/// Avro array-of-records encoding used for data item tags.
///
/// An empty tag list encodes to zero bytes.
pub fn encode_tags(tags: &[Tag]) -> Vec<u8> {
    let mut buf = Vec::new();
    if tags.is_empty() {
        return buf;
    }
    write_long(&mut buf, tags.len() as i64);
    for tag in tags {
        write_bytes(&mut buf, tag.name.as_bytes());
        write_bytes(&mut buf, tag.value.as_bytes());
    }
    write_long(&mut buf, 0);
    buf
}

pub fn decode_tags(bytes: &[u8]) -> GatewayResult<Vec<Tag>> {
    let mut tags = Vec::new();
    if bytes.is_empty() {
        return Ok(tags);
    }
    let mut pos = 0;
    loop {
        let mut count = read_long(bytes, &mut pos)?;
        if count == 0 {
            break;
        }
        // Negative block counts are followed by the block size in bytes
        if count < 0 {
            count = -count;
            read_long(bytes, &mut pos)?;
        }
        for _ in 0..count {
            let name = read_bytes(bytes, &mut pos)?;
            let value = read_bytes(bytes, &mut pos)?;
            tags.push(Tag::new(
                String::from_utf8_lossy(name),
                String::from_utf8_lossy(value),
            ));
        }
    }
    Ok(tags)
}

/// Input to the Arweave deep hash
pub enum DeepHashChunk<'a> {
    Blob(&'a [u8]),
    List(Vec<DeepHashChunk<'a>>),
}

fn sha384(parts: &[&[u8]]) -> [u8; 48] {
    let mut hasher = Sha384::new();
    for part in parts {
        hasher.update(part);
    }
    let mut out = [0u8; 48];
    out.copy_from_slice(&hasher.finalize());
    out
}

pub fn deep_hash(chunk: &DeepHashChunk<'_>) -> [u8; 48] {
    match chunk {
        DeepHashChunk::Blob(data) => {
            let tag = format!("blob{}", data.len());
            let tag_hash = sha384(&[tag.as_bytes()]);
            let data_hash = sha384(&[*data]);
            sha384(&[&tag_hash[..], &data_hash[..]])
        }
        DeepHashChunk::List(items) => {
            let tag = format!("list{}", items.len());
            items
                .iter()
                .fold(sha384(&[tag.as_bytes()]), |acc, item| {
                    let item_hash = deep_hash(item);
                    sha384(&[&acc[..], &item_hash[..]])
                })
        }
    }
}

/// A signed, serialized data item ready to post to the gateway
#[derive(Debug, Clone)]
pub struct DataItem {
    id: String,
    bytes: Vec<u8>,
}

impl DataItem {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn signature(&self) -> &[u8] {
        &self.bytes[2..2 + SIGNATURE_LENGTH]
    }

    pub fn owner(&self) -> &[u8] {
        &self.bytes[2 + SIGNATURE_LENGTH..2 + SIGNATURE_LENGTH + OWNER_LENGTH]
    }

    /// Parse the tag section back out of the serialized item
    pub fn tags(&self) -> GatewayResult<Vec<Tag>> {
        let mut pos = 2 + SIGNATURE_LENGTH + OWNER_LENGTH;
        for _ in 0..2 {
            let flag = *self
                .bytes
                .get(pos)
                .ok_or_else(|| GatewayError::InvalidResponse("truncated data item".to_string()))?;
            pos += 1 + if flag == 1 { 32 } else { 0 };
        }
        let read_u64 = |at: usize| -> GatewayResult<u64> {
            let raw = self
                .bytes
                .get(at..at + 8)
                .ok_or_else(|| GatewayError::InvalidResponse("truncated data item".to_string()))?;
            let mut buf = [0u8; 8];
            buf.copy_from_slice(raw);
            Ok(u64::from_le_bytes(buf))
        };
        let tag_bytes_len = read_u64(pos + 8)? as usize;
        let start = pos + 16;
        let raw = self
            .bytes
            .get(start..start + tag_bytes_len)
            .ok_or_else(|| GatewayError::InvalidResponse("truncated tag section".to_string()))?;
        decode_tags(raw)
    }
}

/// Check tag count and sizes against the data item limits
pub fn validate_tags(tags: &[Tag]) -> GatewayResult<()> {
    if tags.len() > MAX_TAGS {
        return Err(GatewayError::InvalidTag(format!(
            "too many tags: {} (max {})",
            tags.len(),
            MAX_TAGS
        )));
    }
    for tag in tags {
        if tag.name.is_empty() || tag.name.len() > MAX_TAG_NAME_BYTES {
            return Err(GatewayError::InvalidTag(format!("invalid tag name '{}'", tag.name)));
        }
        if tag.value.is_empty() || tag.value.len() > MAX_TAG_VALUE_BYTES {
            return Err(GatewayError::InvalidTag(format!(
                "value for '{}' must be 1 to {} bytes",
                tag.name, MAX_TAG_VALUE_BYTES
            )));
        }
    }
    Ok(())
}

/// Builds and signs [`DataItem`]s
#[derive(Debug, Default)]
pub struct DataItemBuilder {
    data: Vec<u8>,
    tags: Vec<Tag>,
    anchor: Option<[u8; 32]>,
}

impl DataItemBuilder {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            ..Default::default()
        }
    }

    pub fn tags(mut self, tags: Vec<Tag>) -> Self {
        self.tags = tags;
        self
    }

    pub fn anchor(mut self, anchor: [u8; 32]) -> Self {
        self.anchor = Some(anchor);
        self
    }

    /// Random anchor so identical payloads get distinct ids
    pub fn random_anchor(self) -> Self {
        let mut anchor = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut anchor);
        self.anchor(anchor)
    }

    /// Deep hash the item fields would be signed over for `owner`
    pub fn signature_data(&self, owner: &[u8]) -> [u8; 48] {
        let encoded_tags = encode_tags(&self.tags);
        let sig_type = SIGNATURE_TYPE_ETHEREUM.to_string();
        let anchor: &[u8] = self.anchor.as_ref().map(|a| &a[..]).unwrap_or(&[]);
        deep_hash(&DeepHashChunk::List(vec![
            DeepHashChunk::Blob(b"dataitem"),
            DeepHashChunk::Blob(b"1"),
            DeepHashChunk::Blob(sig_type.as_bytes()),
            DeepHashChunk::Blob(owner),
            // no target
            DeepHashChunk::Blob(&[]),
            DeepHashChunk::Blob(anchor),
            DeepHashChunk::Blob(&encoded_tags),
            DeepHashChunk::Blob(&self.data),
        ]))
    }

    pub async fn sign(self, wallet: &ServerWallet) -> GatewayResult<DataItem> {
        validate_tags(&self.tags)?;

        let owner = wallet.public_key();
        if owner.len() != OWNER_LENGTH {
            return Err(GatewayError::Signing(format!(
                "unexpected owner length {}",
                owner.len()
            )));
        }
        let message = self.signature_data(&owner);
        let signature = wallet
            .sign_message(&message)
            .await
            .map_err(|e| GatewayError::Signing(e.to_string()))?
            .to_vec();

        let encoded_tags = encode_tags(&self.tags);
        let mut bytes = Vec::with_capacity(
            2 + SIGNATURE_LENGTH + OWNER_LENGTH + 66 + 16 + encoded_tags.len() + self.data.len(),
        );
        bytes.extend_from_slice(&SIGNATURE_TYPE_ETHEREUM.to_le_bytes());
        bytes.extend_from_slice(&signature);
        bytes.extend_from_slice(&owner);
        // no target
        bytes.push(0);
        match self.anchor {
            Some(anchor) => {
                bytes.push(1);
                bytes.extend_from_slice(&anchor);
            }
            None => bytes.push(0),
        }
        bytes.extend_from_slice(&(self.tags.len() as u64).to_le_bytes());
        bytes.extend_from_slice(&(encoded_tags.len() as u64).to_le_bytes());
        bytes.extend_from_slice(&encoded_tags);
        bytes.extend_from_slice(&self.data);

        let id = URL_SAFE_NO_PAD.encode(Sha256::digest(&signature));
        Ok(DataItem { id, bytes })
    }
}
