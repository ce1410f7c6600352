// Сериализация (MessagePack)

use crate::error::Result;
use rmp_serde::{Deserializer, Serializer};
use serde::{Deserialize, Serialize};

/// Упаковать данные в MessagePack; structs become maps keyed by field name
pub fn pack<T: Serialize + ?Sized>(data: &T) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    data.serialize(&mut Serializer::new(&mut buffer).with_struct_map())?;
    Ok(buffer)
}

/// Распаковать MessagePack
pub fn unpack<'a, T: Deserialize<'a>>(data: &'a [u8]) -> Result<T> {
    let mut deserializer = Deserializer::new(data);
    Ok(T::deserialize(&mut deserializer)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        #[serde(with = "serde_bytes")]
        data: Vec<u8>,
    }

    #[test]
    fn test_pack_uses_field_names() {
        let sample = Sample {
            name: "x".to_string(),
            data: vec![1, 2, 3],
        };
        let packed = pack(&sample).unwrap();
        // fixmap with two entries, first key "name"
        assert_eq!(packed[0], 0x82);
        assert_eq!(&packed[1..6], &[0xa4, b'n', b'a', b'm', b'e']);

        let unpacked: Sample = unpack(&packed).unwrap();
        assert_eq!(unpacked, sample);
    }

    #[test]
    fn test_unpack_garbage_fails() {
        assert!(unpack::<Sample>(&[0xc1]).is_err());
    }
}
