// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use hardware::hwaddr::Guid;
use rand::Rng;

/// A random GUID for an InfiniBand VF.
///
/// The first octet is always within `1..=254`.
pub fn random_guid() -> Guid {
    let mut rng = rand::rng();
    let mut bytes = rng.next_u64().to_be_bytes();
    bytes[0] = 1 + bytes[0] % 0xfe;
    Guid(bytes)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::random_guid;

    #[test]
    fn first_octet_in_range() {
        for _ in 0..1000 {
            let guid = random_guid();
            assert!((1..=254).contains(&guid.0[0]), "{guid}");
        }
    }

    #[test]
    fn successive_guids_differ() {
        assert_ne!(random_guid(), random_guid());
    }
}
