//! Availability zone distribution
//!
//! When host and zone counts match, hosts map 1:1 onto zones. Otherwise hosts
//! are cut into contiguous chunks and chunk `k` goes to `zones[k]`. The chunk
//! size is `zones.len() + 1` for an odd zone count and `zones.len()` for an
//! even one. This bucketing is kept as-is for compatibility with clusters that
//! were already laid out with it; it is not a balanced partition.
//!
//! Chunks past the last zone get no zone and are placed by the provider.

/// Chunk size used when hosts and zones differ in length
pub fn chunk_size(zone_count: usize) -> usize {
    if zone_count % 2 == 1 {
        zone_count + 1
    } else {
        zone_count
    }
}

/// Assign each host a zone, preserving host order.
pub fn distribute<H, Z>(hosts: &[H], zones: &[Z]) -> Vec<(String, Option<String>)>
where
    H: AsRef<str>,
    Z: AsRef<str>,
{
    if zones.is_empty() {
        return hosts
            .iter()
            .map(|host| (host.as_ref().to_string(), None))
            .collect();
    }

    if zones.len() == hosts.len() {
        return hosts
            .iter()
            .zip(zones)
            .map(|(host, zone)| (host.as_ref().to_string(), Some(zone.as_ref().to_string())))
            .collect();
    }

    let end = chunk_size(zones.len());
    hosts
        .chunks(end)
        .enumerate()
        .flat_map(|(index, chunk)| {
            let zone = zones.get(index).map(|z| z.as_ref().to_string());
            chunk
                .iter()
                .map(move |host| (host.as_ref().to_string(), zone.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("h{}", i)).collect()
    }

    fn zone(value: &str) -> Option<String> {
        Some(value.to_string())
    }

    #[test]
    fn test_equal_lengths_map_pairwise() {
        for n in 1..=7 {
            let hosts = names(n);
            let zones: Vec<String> = (0..n).map(|i| format!("zone-{}", i)).collect();
            let result = distribute(&hosts, &zones);
            for (i, (host, assigned)) in result.iter().enumerate() {
                assert_eq!(host, &hosts[i]);
                assert_eq!(assigned.as_deref(), Some(zones[i].as_str()));
            }
        }
    }

    #[test]
    fn test_five_hosts_two_zones() {
        // even zone count: chunk of 2 -> [h1,h2] [h3,h4] [h5]
        let result = distribute(&names(5), &["A", "B"]);
        assert_eq!(
            result,
            vec![
                ("h1".to_string(), zone("A")),
                ("h2".to_string(), zone("A")),
                ("h3".to_string(), zone("B")),
                ("h4".to_string(), zone("B")),
                ("h5".to_string(), None),
            ]
        );
    }

    #[test]
    fn test_odd_zone_count_uses_larger_chunks() {
        // three zones: chunk of 4 -> [h1..h4] [h5]
        let result = distribute(&names(5), &["A", "B", "C"]);
        let zones: Vec<Option<String>> = result.into_iter().map(|(_, z)| z).collect();
        assert_eq!(
            zones,
            vec![zone("A"), zone("A"), zone("A"), zone("A"), zone("B")]
        );
    }

    #[test]
    fn test_more_zones_than_hosts() {
        let result = distribute(&names(2), &["A", "B", "C"]);
        assert_eq!(
            result,
            vec![("h1".to_string(), zone("A")), ("h2".to_string(), zone("A"))]
        );
    }

    #[test]
    fn test_no_zones() {
        let zones: Vec<String> = Vec::new();
        let result = distribute(&names(3), &zones);
        assert!(result.iter().all(|(_, z)| z.is_none()));
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn test_every_host_is_kept() {
        for hosts in 0..12 {
            for zones in 1..6 {
                let zone_names: Vec<String> = (0..zones).map(|z| z.to_string()).collect();
                let result = distribute(&names(hosts), &zone_names);
                let kept: Vec<String> = result.into_iter().map(|(h, _)| h).collect();
                assert_eq!(kept, names(hosts));
            }
        }
    }

    #[test]
    fn test_chunk_size() {
        assert_eq!(chunk_size(1), 2);
        assert_eq!(chunk_size(2), 2);
        assert_eq!(chunk_size(3), 4);
        assert_eq!(chunk_size(4), 4);
    }
}
