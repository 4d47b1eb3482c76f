#[cfg(test)]
mod basic;
#[cfg(test)]
mod grooming;
#[cfg(test)]
mod persistence;

#[cfg(test)]
pub(crate) mod util {
    use osbf::DbConfig;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Creates `n` empty class databases inside a temp dir.
    pub fn fresh_db(dir: &TempDir, n: usize, num_buckets: u32) -> DbConfig {
        let classes: Vec<PathBuf> = (0..n)
            .map(|i| dir.path().join(format!("class{}.cfc", i)))
            .collect();
        osbf::create_db(&classes, num_buckets).unwrap();
        DbConfig {
            classes,
            ncfs: 1,
            delimiters: Vec::new(),
        }
    }

    /// Largest bucket value in a class file, read through the CSV dump.
    pub fn max_bucket_value(dir: &TempDir, class: &PathBuf) -> u32 {
        let csv = dir.path().join("inspect.csv");
        osbf::dump(class, &csv).unwrap();
        let text = std::fs::read_to_string(&csv).unwrap();
        std::fs::remove_file(&csv).unwrap();
        // skip the header pseudo-buckets
        text.lines()
            .skip(341)
            .map(|line| line.rsplit(';').next().unwrap().parse::<u32>().unwrap())
            .max()
            .unwrap()
    }
}
