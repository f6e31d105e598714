//! List (EXI 7.1.11): Länge als Unsigned Integer, dann die Items im
//! Codec des Item-Typs.

use crate::channel::{DecoderChannel, EncoderChannel};
use crate::{Error, Result, unsigned_integer};

/// Obergrenze für decodierte Listenlängen (Schutz vor OOM bei kaputten Streams).
pub const MAX_LIST_LENGTH: u64 = 1 << 24;

pub fn encode<C, T, F>(channel: &mut C, items: &[T], mut encode_item: F) -> Result<()>
where
    C: EncoderChannel + ?Sized,
    F: FnMut(&mut C, &T) -> Result<()>,
{
    unsigned_integer::encode(channel, items.len() as u64)?;
    for item in items {
        encode_item(channel, item)?;
    }
    Ok(())
}

pub fn decode<C, T, F>(channel: &mut C, mut decode_item: F) -> Result<Vec<T>>
where
    C: DecoderChannel + ?Sized,
    F: FnMut(&mut C) -> Result<T>,
{
    let len = unsigned_integer::decode(channel)?;
    if len > MAX_LIST_LENGTH {
        return Err(Error::ListLengthOverflow(len));
    }
    let mut items = Vec::with_capacity((len as usize).min(1 << 12));
    for _ in 0..len {
        items.push(decode_item(channel)?);
    }
    Ok(items)
}

/// Zerlegt ein List-Lexical an XML-Whitespace.
pub fn split_lexical(lexical: &str) -> impl Iterator<Item = &str> {
    lexical.split_ascii_whitespace()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream::{BitDecoderChannel, BitEncoderChannel};
    use crate::integer;

    #[test]
    fn leere_liste() {
        let mut ch = BitEncoderChannel::new(Vec::new());
        encode(&mut ch, &[] as &[i64], |c, v| integer::encode(c, *v)).unwrap();
        let data = ch.into_inner().unwrap();
        assert_eq!(data, vec![0x00]);
        let items: Vec<i64> = decode(&mut BitDecoderChannel::new(&data[..]), |c| integer::decode(c)).unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn integer_liste() {
        let values = [3i64, -7, 1000];
        let mut ch = BitEncoderChannel::new(Vec::new());
        encode(&mut ch, &values, |c, v| integer::encode(c, *v)).unwrap();
        let data = ch.into_inner().unwrap();
        let items: Vec<i64> = decode(&mut BitDecoderChannel::new(&data[..]), |c| integer::decode(c)).unwrap();
        assert_eq!(items, values);
    }

    #[test]
    fn laenge_ueber_limit() {
        let mut ch = BitEncoderChannel::new(Vec::new());
        unsigned_integer::encode(&mut ch, MAX_LIST_LENGTH + 1).unwrap();
        let data = ch.into_inner().unwrap();
        let err = decode(&mut BitDecoderChannel::new(&data[..]), |c| integer::decode(c)).unwrap_err();
        assert_eq!(err, Error::ListLengthOverflow(MAX_LIST_LENGTH + 1));
    }

    #[test]
    fn whitespace_split() {
        let parts: Vec<_> = split_lexical("  1\t2\n 3 ").collect();
        assert_eq!(parts, ["1", "2", "3"]);
    }
}
