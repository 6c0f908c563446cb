pub mod speedrun;
