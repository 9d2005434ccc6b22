use clap::ValueEnum;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProgressOutput {
    /// Terminal progress bars
    Bar,
    /// One JSON snapshot per line on stdout
    Json,
    None,
}
