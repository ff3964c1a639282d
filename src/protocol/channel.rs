use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Logical channels multiplexed over a transport. Records on different channels never interfere,
///  and the transport preserves order per (sender, channel).
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Channel {
    /// message headers (DATA and STOP)
    Header = 1,
    /// the payload transfers that follow a DATA header
    Payload = 2,
    /// demand requests from consumers to their producer
    Demand = 3,
    Barrier = 4,
    Abort = 5,
    /// the sender passed the final barrier and is about to close its connections
    Leave = 6,
}

#[cfg(test)]
mod test {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(1, Some(Channel::Header))]
    #[case(2, Some(Channel::Payload))]
    #[case(3, Some(Channel::Demand))]
    #[case(4, Some(Channel::Barrier))]
    #[case(5, Some(Channel::Abort))]
    #[case(6, Some(Channel::Leave))]
    #[case(0, None)]
    #[case(7, None)]
    fn test_try_from(#[case] raw: u8, #[case] expected: Option<Channel>) {
        assert_eq!(Channel::try_from(raw).ok(), expected);
    }
}
