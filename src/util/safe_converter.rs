/// Widening casts that cannot lose information on the platforms we support.
pub trait SafeCast<T> {
    fn safe_cast(self) -> T;
}

impl SafeCast<u64> for u32 {
    fn safe_cast(self) -> u64 {
        self as u64
    }
}

#[cfg(not(target_pointer_width = "16"))]
impl SafeCast<usize> for u32 {
    fn safe_cast(self) -> usize {
        self as usize
    }
}

#[cfg(target_pointer_width = "64")]
impl SafeCast<u64> for usize {
    fn safe_cast(self) -> u64 {
        self as u64
    }
}

/// For narrowing casts where business logic ensures that the value is in the narrower type's range.
/// NB: The implementations will panic otherwise
pub trait PrecheckedCast<T> {
    fn prechecked_cast(self) -> T;
}

impl PrecheckedCast<u32> for usize {
    fn prechecked_cast(self) -> u32 {
        self.try_into().expect("this is a bug: application logic should have ensured the value range")
    }
}

impl PrecheckedCast<u64> for u128 {
    fn prechecked_cast(self) -> u64 {
        self.try_into().expect("this is a bug: application logic should have ensured the value range")
    }
}

/// Narrowing a length that arrived over the wire: the value is untrusted, so this returns an error
///  instead of panicking
pub fn wire_len_to_usize(len: u64) -> anyhow::Result<usize> {
    usize::try_from(len)
        .map_err(|_| anyhow::anyhow!("received length {} does not fit into this platform's address space", len))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_wire_len_to_usize() {
        assert_eq!(wire_len_to_usize(17).unwrap(), 17usize);
    }

    #[test]
    fn test_prechecked_cast_in_range() {
        let len: u32 = 1234usize.prechecked_cast();
        assert_eq!(len, 1234);
    }
}
