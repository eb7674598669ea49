#[cfg(test)]
mod fixtures;

#[cfg(test)]
mod level_detect;
