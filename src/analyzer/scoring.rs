use super::metrics::{AudioStats, QualityCategory, QualityScore};

/// 单项评分档位：`(下限, 分值)`，按下限降序排列，首个满足 `value >= 下限` 的档位生效。
type Tier = (u32, u32);

const SAMPLE_RATE_TIERS: [Tier; 3] = [(48_000, 30), (44_100, 25), (32_000, 20)];
const SAMPLE_RATE_FLOOR: u32 = 10;

const BITRATE_TIERS: [Tier; 5] = [(320, 40), (256, 35), (192, 30), (128, 25), (96, 20)];
const BITRATE_FLOOR: u32 = 10;

const STEREO_POINTS: u32 = 15;
const NON_STEREO_POINTS: u32 = 10;

const BIT_DEPTH_TIERS: [Tier; 2] = [(24, 15), (16, 12)];
const BIT_DEPTH_FLOOR: u32 = 8;

/// 所有因子都取最低档时的总分。
pub const MIN_SCORE: u32 = SAMPLE_RATE_FLOOR + BITRATE_FLOOR + NON_STEREO_POINTS + BIT_DEPTH_FLOOR;
pub const MAX_SCORE: u32 = 100;

/// 各因子的得分明细，便于详细日志输出。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreBreakdown {
    pub sample_rate: u32,
    pub bitrate: u32,
    pub channels: u32,
    pub bit_depth: u32,
}

impl ScoreBreakdown {
    pub fn total(&self) -> u32 {
        self.sample_rate + self.bitrate + self.channels + self.bit_depth
    }
}

/// 确定性的四因子质量评分器：采样率 (30) + 码率 (40) + 声道 (15) + 位深 (15)。
///
/// 档位表必须精确复现，测试夹具依赖具体分值。
#[derive(Debug, Default, Clone, Copy)]
pub struct QualityScorer;

impl QualityScorer {
    pub fn new() -> Self {
        Self
    }

    pub fn score(&self, stats: &AudioStats) -> QualityScore {
        let score = self.breakdown(stats).total().clamp(MIN_SCORE, MAX_SCORE);
        QualityScore {
            score,
            category: QualityCategory::from_score(score),
        }
    }

    pub fn breakdown(&self, stats: &AudioStats) -> ScoreBreakdown {
        ScoreBreakdown {
            sample_rate: tier_points(stats.sample_rate_hz, &SAMPLE_RATE_TIERS, SAMPLE_RATE_FLOOR),
            bitrate: tier_points(stats.estimated_bitrate_kbps, &BITRATE_TIERS, BITRATE_FLOOR),
            channels: if stats.channels == 2 {
                STEREO_POINTS
            } else {
                NON_STEREO_POINTS
            },
            bit_depth: tier_points(stats.bit_depth, &BIT_DEPTH_TIERS, BIT_DEPTH_FLOOR),
        }
    }
}

fn tier_points(value: u32, tiers: &[Tier], floor: u32) -> u32 {
    tiers
        .iter()
        .find(|(threshold, _)| value >= *threshold)
        .map(|(_, points)| *points)
        .unwrap_or(floor)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_stats(sample_rate_hz: u32, bitrate_kbps: u32, channels: u32, bit_depth: u32) -> AudioStats {
        AudioStats {
            duration_seconds: 60.0,
            sample_rate_hz,
            channels,
            bit_depth,
            peak_level_dbfs: -1.0,
            average_level_dbfs: -18.0,
            size_bytes: 1_000_000,
            estimated_bitrate_kbps: bitrate_kbps,
        }
    }

    #[test]
    fn test_studio_mp3_scores_97_excellent() {
        let scorer = QualityScorer::new();
        let result = scorer.score(&create_test_stats(48_000, 320, 2, 16));
        assert_eq!(result.score, 30 + 40 + 15 + 12);
        assert_eq!(result.score, 97);
        assert_eq!(result.category, QualityCategory::Excellent);
    }

    #[test]
    fn test_media_profile_output() {
        // media 档：44.1kHz / 128k / 立体声 / 16bit 解码
        let scorer = QualityScorer::new();
        let result = scorer.score(&create_test_stats(44_100, 128, 2, 16));
        assert_eq!(result.score, 25 + 25 + 15 + 12);
        assert_eq!(result.category, QualityCategory::VeryGood);
    }

    #[test]
    fn test_baixa_profile_output() {
        let scorer = QualityScorer::new();
        let result = scorer.score(&create_test_stats(22_050, 64, 1, 16));
        assert_eq!(result.score, 10 + 10 + 10 + 12);
        assert_eq!(result.category, QualityCategory::Low);
    }

    #[test]
    fn test_score_bounds() {
        let scorer = QualityScorer::new();
        let worst = scorer.score(&create_test_stats(8_000, 0, 1, 8));
        assert_eq!(worst.score, MIN_SCORE);
        assert_eq!(worst.score, 38);

        let best = scorer.score(&create_test_stats(96_000, 1411, 2, 24));
        assert_eq!(best.score, MAX_SCORE);
    }

    #[test]
    fn test_tier_boundaries_are_inclusive() {
        let scorer = QualityScorer::new();

        let b = scorer.breakdown(&create_test_stats(44_099, 95, 6, 15));
        assert_eq!((b.sample_rate, b.bitrate, b.channels, b.bit_depth), (20, 10, 10, 8));

        let b = scorer.breakdown(&create_test_stats(44_100, 96, 2, 16));
        assert_eq!((b.sample_rate, b.bitrate, b.channels, b.bit_depth), (25, 20, 15, 12));

        let b = scorer.breakdown(&create_test_stats(32_000, 192, 1, 24));
        assert_eq!((b.sample_rate, b.bitrate, b.bit_depth), (20, 30, 15));

        let b = scorer.breakdown(&create_test_stats(31_999, 256, 2, 32));
        assert_eq!((b.sample_rate, b.bitrate, b.bit_depth), (10, 35, 15));
    }

    #[test]
    fn test_every_combination_stays_in_range() {
        let scorer = QualityScorer::new();
        for &sr in &[8_000, 32_000, 44_100, 48_000, 192_000] {
            for &kbps in &[0, 96, 128, 192, 256, 320, 5_000] {
                for &ch in &[1, 2, 6] {
                    for &bits in &[8, 16, 24, 32] {
                        let result = scorer.score(&create_test_stats(sr, kbps, ch, bits));
                        assert!((MIN_SCORE..=MAX_SCORE).contains(&result.score));
                        assert_eq!(result.category, QualityCategory::from_score(result.score));
                    }
                }
            }
        }
    }
}
