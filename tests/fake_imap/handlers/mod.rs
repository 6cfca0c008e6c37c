//! IMAP command handlers for the fake server.
//!
//! One module per command, except the state-independent CAPABILITY,
//! NOOP and LOGOUT which share `session`. Message commands address
//! messages by sequence number.

mod login;
mod select;

pub use expunge::handle_expunge;
pub use fetch::handle_fetch;
pub use login::handle_login;
pub use search::handle_search;
pub use select::handle_select;
pub use session::{handle_capability, handle_logout, handle_noop};
pub use store::{StoreArgs, handle_store};

use imap_codec::imap_types::sequence::{SeqOrUid, Sequence, SequenceSet};

/// Expand a `SequenceSet` into sequence numbers, resolving `*` to
/// `max`. Ranges may be given in either order.
fn sequence_numbers(seq_set: &SequenceSet, max: u32) -> Vec<u32> {
    let resolve = |s: &SeqOrUid| match s {
        SeqOrUid::Value(v) => v.get(),
        SeqOrUid::Asterisk => max,
    };
    let mut numbers = Vec::new();
    for seq in seq_set.0.as_ref() {
        match seq {
            Sequence::Single(s) => numbers.push(resolve(s)),
            Sequence::Range(a, b) => {
                let (lo, hi) = (resolve(a).min(resolve(b)), resolve(a).max(resolve(b)));
                numbers.extend(lo..=hi);
            }
        }
    }
    numbers
}

#[cfg(test)]
pub(crate) mod test_support {
    use imap_codec::imap_types::sequence::{SeqOrUid, Sequence, SequenceSet};
    use std::num::NonZeroU32;
    use tokio::io::{AsyncReadExt, BufReader, DuplexStream};

    pub fn seq_set(n: u32) -> SequenceSet {
        SequenceSet(
            vec![Sequence::Single(SeqOrUid::Value(NonZeroU32::new(n).unwrap()))]
                .try_into()
                .unwrap(),
        )
    }

    /// Drain everything the handler wrote to the client side.
    pub async fn read_all(client: DuplexStream) -> String {
        let mut buf = Vec::new();
        BufReader::new(client).read_to_end(&mut buf).await.unwrap();
        String::from_utf8(buf).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroU32;

    #[test]
    fn expands_ranges_and_asterisk() {
        let set = SequenceSet(
            vec![
                Sequence::Single(SeqOrUid::Value(NonZeroU32::new(1).unwrap())),
                Sequence::Range(SeqOrUid::Value(NonZeroU32::new(3).unwrap()), SeqOrUid::Asterisk),
            ]
            .try_into()
            .unwrap(),
        );
        assert_eq!(sequence_numbers(&set, 5), vec![1, 3, 4, 5]);
    }
}
