//! Node profile properties (class 0x0E, 0xF0).

use crate::error::CodecError;
use crate::object::EnetObject;
use crate::property::device::expect_len;
use crate::property::Property;

/// Instance list notification (0xD5): the self-node instances announced at
/// startup and on composition changes.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct InstanceList {
    pub objects: Vec<EnetObject>,
}

impl InstanceList {
    pub fn decode(data: &[u8]) -> Result<InstanceList, CodecError> {
        if data.is_empty() {
            return Err(CodecError::Length { expected: 1, got: 0 });
        }

        let count = data[0] as usize;
        expect_len(data, 1 + count * 3)?;

        let mut objects = Vec::with_capacity(count);
        for chunk in data[1..].chunks_exact(3) {
            objects.push(EnetObject::decode(chunk)?);
        }

        Ok(InstanceList { objects })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.objects.len() * 3);
        out.push(self.objects.len() as u8);
        for object in &self.objects {
            object.encode(&mut out);
        }
        out
    }
}

/// Decoder dispatch for the node profile class.
pub(crate) fn decode(epc: u8, edt: &[u8]) -> Result<Option<Property>, CodecError> {
    match epc {
        0xD5 => Ok(Some(Property::InstanceList(InstanceList::decode(edt)?))),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_single_instance() {
        let list = InstanceList::decode(&[0x01, 0x02, 0x88, 0x01]).unwrap();

        assert_eq!(list.objects, vec![EnetObject::from_raw(0x02, 0x88, 0x01)]);
        assert_eq!(list.encode(), vec![0x01, 0x02, 0x88, 0x01]);
    }

    #[test]
    fn test_count_mismatch() {
        assert_eq!(
            InstanceList::decode(&[0x02, 0x02, 0x88, 0x01]),
            Err(CodecError::Length { expected: 7, got: 4 })
        );
    }
}
