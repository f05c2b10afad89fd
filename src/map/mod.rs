// Reference map: station positions, team colors and pin rendering.

pub mod render;
pub mod stations;
pub mod teams;
