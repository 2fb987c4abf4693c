pub mod geometry;
pub mod landmarks;
pub mod posture_angles;
pub mod scorer;
pub mod slouch_timer;
pub mod stabilizer;
