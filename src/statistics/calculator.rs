use std::collections::BTreeMap;

use itertools::Itertools;
use log::debug;

use crate::errors::LapStatsError;
use crate::laps::Lap;

use super::{
    ChartData, DEFAULT_SECTOR_COUNT, DriverStatistics, DriverStatisticsMap, FastestLap,
    LapHighlights, SectorHighlight, SectorStatistics, SessionStatistics,
};

/// Racing lap count above which the two slowest laps are trimmed before
/// computing consistency
const CONSISTENCY_TRIM_THRESHOLD: usize = 3;
const CONSISTENCY_TRIMMED_LAPS: usize = 2;

/// Pure calculator over a snapshot of one session's lap log.
///
/// The same lap slice always yields the same output. Iteration follows the
/// order of the slice, which is the order laps were written to the log, so
/// ties (e.g. two laps sharing the fastest time) resolve to the first lap
/// encountered.
pub struct StatisticsCalculator<'a> {
    laps: &'a [Lap],
}

impl<'a> StatisticsCalculator<'a> {
    pub fn new(laps: &'a [Lap]) -> Self {
        Self { laps }
    }

    /// Calculate every derived quantity for the session.
    ///
    /// An empty lap log is not an error and yields empty statistics. Laps with
    /// non-finite or non-positive times are rejected as malformed.
    pub fn calculate_all(&self) -> Result<SessionStatistics, LapStatsError> {
        for lap in self.laps {
            lap.validate()?;
        }

        let fastest_lap = self.fastest_lap();
        let statistics = SessionStatistics {
            driver_statistics: self.driver_statistics(),
            chart_data: self.chart_data(),
            sector_statistics: self.sector_statistics(),
            fastest_lap_time: fastest_lap.as_ref().map(|f| f.time),
            fastest_lap_driver: fastest_lap.map(|f| f.driver),
            total_laps: self.total_laps(),
            total_drivers: self.total_drivers(),
        };
        debug!(
            "Calculated statistics for {} laps across {} drivers",
            statistics.total_laps, statistics.total_drivers
        );
        Ok(statistics)
    }

    /// Distinct driver names in order of first appearance
    fn drivers(&self) -> Vec<&'a str> {
        self.laps
            .iter()
            .map(|lap| lap.driver_name.as_str())
            .unique()
            .collect()
    }

    fn racing_laps(&self) -> impl Iterator<Item = &'a Lap> + 'a {
        self.laps.iter().filter(|lap| lap.is_racing_lap())
    }

    fn driver_laps(&self, driver: &'a str) -> impl Iterator<Item = &'a Lap> + 'a {
        self.laps.iter().filter(move |lap| lap.driver_name == driver)
    }

    pub fn driver_statistics(&self) -> DriverStatisticsMap {
        self.drivers()
            .into_iter()
            .filter_map(|driver| {
                self.driver_statistics_for(driver)
                    .map(|stats| (driver.to_string(), stats))
            })
            .collect()
    }

    /// Statistics for one driver, `None` when the driver has no laps at all
    pub fn driver_statistics_for(&self, driver: &str) -> Option<DriverStatistics> {
        let all_laps = self
            .laps
            .iter()
            .filter(|lap| lap.driver_name == driver)
            .collect_vec();
        if all_laps.is_empty() {
            return None;
        }

        let mut lap_times = all_laps
            .iter()
            .filter(|lap| lap.is_racing_lap())
            .map(|lap| lap.total_time)
            .collect_vec();
        if lap_times.is_empty() {
            // only out laps, use them rather than dropping the driver
            lap_times = all_laps.iter().map(|lap| lap.total_time).collect_vec();
        }

        Some(DriverStatistics {
            best_lap_time: min_time(lap_times.iter().copied())?,
            optimal_lap_time: self.optimal_lap_time(driver),
            lap_count: all_laps.len(),
            racing_lap_count: lap_times.len(),
            avg_lap_time: mean(&lap_times),
            consistency: consistency(&lap_times),
            visible: true,
        })
    }

    /// Sum of the driver's best time at each sector index over racing laps.
    ///
    /// Can be faster than any lap actually driven since it combines splits
    /// from different laps.
    pub fn optimal_lap_time(&self, driver: &str) -> Option<f64> {
        let racing_laps = self
            .laps
            .iter()
            .filter(|lap| lap.driver_name == driver && lap.is_racing_lap())
            .collect_vec();
        let sector_count = racing_laps
            .iter()
            .map(|lap| lap.sectors.len())
            .max()
            .unwrap_or(0);
        if sector_count == 0 {
            return None;
        }

        let best_sectors = (0..sector_count)
            .filter_map(|idx| min_time(racing_laps.iter().filter_map(|lap| lap.sector(idx))))
            .collect_vec();
        if best_sectors.is_empty() {
            None
        } else {
            Some(best_sectors.iter().sum())
        }
    }

    pub fn chart_data(&self) -> ChartData {
        let lap_numbers = self
            .laps
            .iter()
            .map(|lap| lap.lap_number)
            .sorted()
            .dedup()
            .collect_vec();

        self.drivers()
            .into_iter()
            .map(|driver| {
                let series = lap_numbers
                    .iter()
                    .map(|&lap_number| {
                        let time = self
                            .driver_laps(driver)
                            .find(|lap| lap.lap_number == lap_number)
                            .map(|lap| lap.total_time);
                        (lap_number, time)
                    })
                    .collect();
                (driver.to_string(), series)
            })
            .collect()
    }

    pub fn sector_statistics(&self) -> SectorStatistics {
        let drivers = self.drivers();
        let racing_laps = self.racing_laps().collect_vec();

        let max_sectors = self
            .laps
            .iter()
            .map(|lap| lap.sectors.len())
            .max()
            .unwrap_or(0);
        let sector_count = if max_sectors > 0 {
            max_sectors
        } else {
            DEFAULT_SECTOR_COUNT
        };

        let mut sector_highlights = BTreeMap::new();
        for idx in 0..sector_count {
            let highlight = min_max(racing_laps.iter().filter_map(|lap| lap.sector(idx)))
                // no racing lap reached this sector, fall back to out laps
                .or_else(|| min_max(self.laps.iter().filter_map(|lap| lap.sector(idx))));
            if let Some((fastest, slowest)) = highlight {
                sector_highlights.insert(idx, SectorHighlight { fastest, slowest });
            }
        }

        let mut driver_pb_sectors = BTreeMap::new();
        let mut driver_pb_total = BTreeMap::new();
        for &driver in &drivers {
            let driver_racing_laps = racing_laps
                .iter()
                .filter(|lap| lap.driver_name == driver)
                .collect_vec();

            let pb_sectors: BTreeMap<usize, f64> = (0..sector_count)
                .filter_map(|idx| {
                    min_time(driver_racing_laps.iter().filter_map(|lap| lap.sector(idx)))
                        .map(|pb| (idx, pb))
                })
                .collect();
            driver_pb_sectors.insert(driver.to_string(), pb_sectors);

            if let Some(pb) = min_time(driver_racing_laps.iter().map(|lap| lap.total_time)) {
                driver_pb_total.insert(driver.to_string(), pb);
            }
        }

        let totals = if racing_laps.is_empty() {
            min_max(self.laps.iter().map(|lap| lap.total_time))
        } else {
            min_max(racing_laps.iter().map(|lap| lap.total_time))
        };

        SectorStatistics {
            sector_highlights,
            driver_pb_sectors,
            lap_highlights: LapHighlights {
                fastest_total: totals.map(|(fastest, _)| fastest),
                slowest_total: totals.map(|(_, slowest)| slowest),
                driver_pb_total,
            },
            sector_count,
        }
    }

    /// Fastest racing lap of the session, first encountered on ties
    pub fn fastest_lap(&self) -> Option<FastestLap> {
        self.racing_laps()
            .fold(None::<&Lap>, |fastest, lap| match fastest {
                Some(current) if lap.total_time >= current.total_time => Some(current),
                _ => Some(lap),
            })
            .map(|lap| FastestLap {
                time: lap.total_time,
                driver: lap.driver_name.clone(),
            })
    }

    pub fn total_laps(&self) -> usize {
        self.laps.len()
    }

    pub fn total_drivers(&self) -> usize {
        self.drivers().len()
    }
}

fn min_time(times: impl Iterator<Item = f64>) -> Option<f64> {
    times.reduce(|min, t| if t < min { t } else { min })
}

fn min_max(times: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    times.fold(None, |acc, t| match acc {
        None => Some((t, t)),
        Some((min, max)) => Some((
            if t < min { t } else { min },
            if t > max { t } else { max },
        )),
    })
}

fn mean(times: &[f64]) -> f64 {
    times.iter().sum::<f64>() / times.len() as f64
}

/// Standard deviation dividing by N, not N - 1
fn population_std_dev(times: &[f64]) -> f64 {
    let avg = mean(times);
    let variance = times.iter().map(|t| (t - avg) * (t - avg)).sum::<f64>() / times.len() as f64;
    variance.sqrt()
}

fn consistency(times: &[f64]) -> f64 {
    match times.len() {
        0 | 1 => 0.0,
        n if n <= CONSISTENCY_TRIM_THRESHOLD => population_std_dev(times),
        n => {
            let sorted = times
                .iter()
                .copied()
                .sorted_by(|a, b| a.total_cmp(b))
                .collect_vec();
            population_std_dev(&sorted[..n - CONSISTENCY_TRIMMED_LAPS])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::laps::{NewLap, SessionId};
    use proptest::prelude::*;
    use std::collections::HashSet;

    const EPSILON: f64 = 1e-9;

    fn lap(lap_number: u32, driver: &str, car_index: u32, total_time: f64, sectors: &[f64]) -> Lap {
        NewLap::new(lap_number, driver, car_index, total_time)
            .with_sectors(sectors.to_vec())
            .into_lap(SessionId(1))
    }

    /// Four racing laps for one driver and two for another, all with sectors
    fn multi_driver_laps() -> Vec<Lap> {
        vec![
            lap(1, "TestDriver1", 0, 120.0, &[40.0, 41.0, 40.0]),
            lap(2, "TestDriver1", 0, 122.0, &[41.0, 41.0, 40.0]),
            lap(3, "TestDriver1", 0, 121.5, &[40.5, 41.0, 40.0]),
            lap(4, "TestDriver1", 0, 123.0, &[41.5, 41.0, 40.5]),
            lap(1, "TestDriver2", 1, 125.0, &[42.0, 42.0, 41.0]),
            lap(2, "TestDriver2", 1, 124.0, &[41.5, 42.0, 40.5]),
        ]
    }

    #[test]
    fn test_two_lap_driver_scenario() {
        let laps = vec![
            lap(1, "Driver", 0, 90.567, &[30.123, 30.234, 30.210]),
            lap(2, "Driver", 0, 91.0, &[30.0, 30.5, 30.5]),
        ];
        let stats = StatisticsCalculator::new(&laps).calculate_all().unwrap();
        let driver = &stats.driver_statistics["Driver"];

        assert_eq!(driver.best_lap_time, 90.567);
        assert!((driver.avg_lap_time - 90.7835).abs() < EPSILON);
        assert_eq!(driver.lap_count, 2);
        assert_eq!(driver.racing_lap_count, 2);
        assert!(driver.consistency > 0.0);
        assert!((driver.consistency - 0.2165).abs() < EPSILON);
        assert!(driver.visible);

        let optimal = driver.optimal_lap_time.unwrap();
        assert!((optimal - (30.0 + 30.234 + 30.210)).abs() < EPSILON);
        assert!(optimal <= driver.best_lap_time);
    }

    #[test]
    fn test_out_lap_exclusion() {
        let laps = vec![
            lap(0, "TestDriver", 0, 130.0, &[45.0, 45.0, 40.0]),
            lap(1, "TestDriver", 0, 120.0, &[40.0, 40.0, 40.0]),
        ];
        let stats = StatisticsCalculator::new(&laps).calculate_all().unwrap();

        assert_eq!(stats.fastest_lap_time, Some(120.0));
        assert_eq!(stats.fastest_lap_driver.as_deref(), Some("TestDriver"));

        let driver = &stats.driver_statistics["TestDriver"];
        assert_eq!(driver.best_lap_time, 120.0);
        assert_eq!(driver.lap_count, 2);
        assert_eq!(driver.racing_lap_count, 1);
        assert_eq!(driver.consistency, 0.0);
        assert_eq!(driver.optimal_lap_time, Some(120.0));
    }

    #[test]
    fn test_empty_session() {
        let stats = StatisticsCalculator::new(&[]).calculate_all().unwrap();

        assert!(stats.driver_statistics.is_empty());
        assert!(stats.chart_data.is_empty());
        assert_eq!(stats.fastest_lap_time, None);
        assert_eq!(stats.fastest_lap_driver, None);
        assert!(stats.fastest_lap().is_none());
        assert_eq!(stats.total_laps, 0);
        assert_eq!(stats.total_drivers, 0);
        assert_eq!(stats.sector_statistics.sector_count, DEFAULT_SECTOR_COUNT);
        assert!(stats.sector_statistics.sector_highlights.is_empty());
        assert_eq!(stats.sector_statistics.lap_highlights.fastest_total, None);
        assert_eq!(stats.sector_statistics.lap_highlights.slowest_total, None);
    }

    #[test]
    fn test_out_lap_only_driver_falls_back_to_all_laps() {
        let laps = vec![
            lap(0, "Rookie", 3, 135.0, &[45.0, 45.0, 45.0]),
            lap(1, "Veteran", 0, 121.0, &[40.0, 41.0, 40.0]),
        ];
        let stats = StatisticsCalculator::new(&laps).calculate_all().unwrap();

        let rookie = &stats.driver_statistics["Rookie"];
        assert_eq!(rookie.best_lap_time, 135.0);
        assert_eq!(rookie.avg_lap_time, 135.0);
        assert_eq!(rookie.lap_count, 1);
        assert_eq!(rookie.racing_lap_count, 1);
        assert_eq!(rookie.consistency, 0.0);
        // optimal lap only ever considers racing laps
        assert_eq!(rookie.optimal_lap_time, None);

        // the out lap never counts as the session's fastest
        assert_eq!(stats.fastest_lap_time, Some(121.0));
        assert_eq!(stats.fastest_lap_driver.as_deref(), Some("Veteran"));

        // nor as a personal best
        let pb_total = &stats.sector_statistics.lap_highlights.driver_pb_total;
        assert!(!pb_total.contains_key("Rookie"));
        assert!(stats.sector_statistics.driver_pb_sectors["Rookie"].is_empty());
    }

    #[test]
    fn test_consistency_drops_two_slowest_laps() {
        let laps = multi_driver_laps();
        let stats = StatisticsCalculator::new(&laps).driver_statistics();

        // [120.0, 121.5] remain after dropping 123.0 and 122.0
        let driver1 = &stats["TestDriver1"];
        assert!((driver1.consistency - 0.75).abs() < EPSILON);
        assert_eq!(driver1.best_lap_time, 120.0);
        assert!((driver1.avg_lap_time - 121.625).abs() < EPSILON);
        assert_eq!(driver1.optimal_lap_time, Some(40.0 + 41.0 + 40.0));

        // two laps are used as-is
        let driver2 = &stats["TestDriver2"];
        assert!((driver2.consistency - 0.5).abs() < EPSILON);
        assert_eq!(driver2.optimal_lap_time, Some(41.5 + 42.0 + 40.5));
    }

    #[test]
    fn test_consistency_three_laps_untrimmed() {
        assert_eq!(consistency(&[100.0]), 0.0);
        assert_eq!(consistency(&[]), 0.0);
        let three = [100.0, 101.0, 102.0];
        assert!((consistency(&three) - (2.0f64 / 3.0).sqrt()).abs() < EPSILON);
        // four laps: 110 and 120 are trimmed
        assert!((consistency(&[100.0, 120.0, 101.0, 110.0]) - 0.5).abs() < EPSILON);
    }

    #[test]
    fn test_optimal_lap_with_missing_sectors() {
        let laps = vec![
            lap(1, "Driver", 0, 95.0, &[31.0, 32.0]),
            lap(2, "Driver", 0, 96.0, &[30.5, 33.0, 31.5]),
            lap(3, "Driver", 0, 97.0, &[]),
        ];
        let calculator = StatisticsCalculator::new(&laps);
        let optimal = calculator.optimal_lap_time("Driver").unwrap();
        assert!((optimal - (30.5 + 32.0 + 31.5)).abs() < EPSILON);

        let no_sectors = vec![lap(1, "Driver", 0, 95.0, &[])];
        assert_eq!(
            StatisticsCalculator::new(&no_sectors).optimal_lap_time("Driver"),
            None
        );
        assert_eq!(calculator.optimal_lap_time("Nobody"), None);
    }

    #[test]
    fn test_chart_data_is_dense() {
        let laps = vec![
            lap(0, "A", 0, 130.0, &[]),
            lap(1, "A", 0, 120.0, &[]),
            lap(2, "A", 0, 119.0, &[]),
            lap(1, "B", 1, 125.0, &[]),
            lap(3, "B", 1, 124.0, &[]),
        ];
        let chart = StatisticsCalculator::new(&laps).chart_data();

        assert_eq!(chart.len(), 2);
        for series in chart.values() {
            assert_eq!(series.keys().copied().collect_vec(), vec![0, 1, 2, 3]);
        }
        assert_eq!(chart["A"][&0], Some(130.0));
        assert_eq!(chart["A"][&3], None);
        assert_eq!(chart["B"][&0], None);
        assert_eq!(chart["B"][&2], None);
        assert_eq!(chart["B"][&3], Some(124.0));
    }

    #[test]
    fn test_sector_statistics() {
        let mut laps = multi_driver_laps();
        laps.push(lap(0, "TestDriver2", 1, 140.0, &[39.0, 50.0, 45.0, 10.0]));
        let sectors = StatisticsCalculator::new(&laps).sector_statistics();

        // the out lap carries the longest sector array
        assert_eq!(sectors.sector_count, 4);

        // racing laps only where they have data
        assert_eq!(
            sectors.sector_highlights[&0],
            SectorHighlight {
                fastest: 40.0,
                slowest: 42.0
            }
        );
        assert_eq!(
            sectors.sector_highlights[&2],
            SectorHighlight {
                fastest: 40.0,
                slowest: 41.0
            }
        );
        // only the out lap reached sector 4
        assert_eq!(
            sectors.sector_highlights[&3],
            SectorHighlight {
                fastest: 10.0,
                slowest: 10.0
            }
        );

        assert_eq!(sectors.driver_pb_sectors["TestDriver1"][&0], 40.0);
        assert_eq!(sectors.driver_pb_sectors["TestDriver2"][&0], 41.5);
        assert!(!sectors.driver_pb_sectors["TestDriver2"].contains_key(&3));

        let highlights = &sectors.lap_highlights;
        assert_eq!(highlights.fastest_total, Some(120.0));
        assert_eq!(highlights.slowest_total, Some(125.0));
        assert_eq!(highlights.driver_pb_total["TestDriver1"], 120.0);
        assert_eq!(highlights.driver_pb_total["TestDriver2"], 124.0);
    }

    #[test]
    fn test_lap_highlights_fall_back_to_out_laps() {
        let laps = vec![lap(0, "A", 0, 130.0, &[]), lap(0, "B", 1, 128.0, &[])];
        let stats = StatisticsCalculator::new(&laps).calculate_all().unwrap();

        assert_eq!(stats.sector_statistics.sector_count, DEFAULT_SECTOR_COUNT);
        assert_eq!(stats.sector_statistics.lap_highlights.fastest_total, Some(128.0));
        assert_eq!(stats.sector_statistics.lap_highlights.slowest_total, Some(130.0));
        assert!(stats.sector_statistics.lap_highlights.driver_pb_total.is_empty());
        assert_eq!(stats.fastest_lap_time, None);
        assert_eq!(stats.total_drivers, 2);
    }

    #[test]
    fn test_fastest_lap_tie_keeps_first_encountered() {
        let laps = vec![
            lap(1, "Second", 1, 121.0, &[]),
            lap(2, "First", 0, 119.5, &[]),
            lap(2, "Later", 2, 119.5, &[]),
        ];
        let fastest = StatisticsCalculator::new(&laps).fastest_lap().unwrap();
        assert_eq!(fastest.time, 119.5);
        assert_eq!(fastest.driver, "First");
    }

    #[test]
    fn test_malformed_lap_is_rejected() {
        let laps = vec![lap(1, "A", 0, 120.0, &[]), lap(2, "A", 0, f64::NAN, &[])];
        let result = StatisticsCalculator::new(&laps).calculate_all();
        assert!(matches!(result, Err(LapStatsError::MalformedLap { .. })));
    }

    fn arb_laps() -> impl Strategy<Value = Vec<Lap>> {
        prop::collection::vec(
            (
                0u32..4,
                0u32..8,
                prop::collection::vec(20.0f64..45.0, 3),
            ),
            0..40,
        )
        .prop_map(|entries| {
            let mut seen = HashSet::new();
            entries
                .into_iter()
                .filter(|(car, lap_number, _)| seen.insert((*lap_number, *car)))
                .map(|(car, lap_number, sectors)| {
                    let total: f64 = sectors.iter().sum();
                    lap(lap_number, &format!("Driver{}", car), car, total, &sectors)
                })
                .collect()
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_driver_keys_match_lap_log(laps in arb_laps()) {
            let stats = StatisticsCalculator::new(&laps).calculate_all().unwrap();
            let drivers: HashSet<String> = laps.iter().map(|l| l.driver_name.clone()).collect();
            let keys: HashSet<String> = stats.driver_statistics.keys().cloned().collect();

            prop_assert_eq!(&keys, &drivers);
            prop_assert_eq!(stats.total_drivers, drivers.len());
            prop_assert_eq!(stats.total_laps, laps.len());
            let chart_keys: HashSet<String> = stats.chart_data.keys().cloned().collect();
            prop_assert_eq!(&chart_keys, &drivers);
        }

        #[test]
        fn prop_calculation_is_idempotent(laps in arb_laps()) {
            let first = StatisticsCalculator::new(&laps).calculate_all().unwrap();
            let second = StatisticsCalculator::new(&laps).calculate_all().unwrap();
            prop_assert_eq!(&first, &second);
            prop_assert_eq!(
                serde_json::to_string(&first).unwrap(),
                serde_json::to_string(&second).unwrap()
            );
        }

        #[test]
        fn prop_optimal_never_slower_than_best(laps in arb_laps()) {
            let stats = StatisticsCalculator::new(&laps).calculate_all().unwrap();
            for (driver, driver_stats) in &stats.driver_statistics {
                let has_racing_lap = laps
                    .iter()
                    .any(|l| &l.driver_name == driver && l.is_racing_lap());
                if has_racing_lap {
                    let optimal = driver_stats.optimal_lap_time.unwrap();
                    prop_assert!(
                        optimal <= driver_stats.best_lap_time,
                        "optimal {} slower than best {} for {}",
                        optimal, driver_stats.best_lap_time, driver
                    );
                }
            }
        }

        #[test]
        fn prop_consistency_trims_two_slowest(laps in arb_laps()) {
            let stats = StatisticsCalculator::new(&laps).calculate_all().unwrap();
            for (driver, driver_stats) in &stats.driver_statistics {
                let mut times = laps
                    .iter()
                    .filter(|l| &l.driver_name == driver && l.is_racing_lap())
                    .map(|l| l.total_time)
                    .collect_vec();
                if times.len() <= 3 {
                    continue;
                }
                times.sort_by(|a, b| a.total_cmp(b));
                times.truncate(times.len() - 2);
                let avg = times.iter().sum::<f64>() / times.len() as f64;
                let variance = times.iter().map(|t| (t - avg).powi(2)).sum::<f64>() / times.len() as f64;

                prop_assert!((driver_stats.consistency - variance.sqrt()).abs() < 1e-9);
            }
        }
    }
}
