use std::path::{Path, PathBuf};

use tokio::{
    fs::File,
    io::{self, AsyncBufReadExt, Lines},
};

/// Read a file from the given path into a list of strings
pub async fn read_file(path: impl AsRef<Path>) -> io::Result<Vec<String>> {
    let mut r = file_reader(path.as_ref()).await?;
    let mut lines = Vec::new();

    while let Some(line) = r.next_line().await? {
        lines.push(line);
    }

    Ok(lines)
}

async fn file_reader(path: &Path) -> io::Result<Lines<io::BufReader<File>>> {
    let f = File::open(path).await?;

    Ok(io::BufReader::new(f).lines())
}

/// Find the next free `version_{n}` directory below the given root
pub fn next_version_dir(root: &Path) -> std::io::Result<PathBuf> {
    let mut next = 0;

    if root.exists() {
        for entry in std::fs::read_dir(root)? {
            let name = entry?.file_name();
            let version = name
                .to_str()
                .and_then(|name| name.strip_prefix("version_"))
                .and_then(|n| n.parse::<usize>().ok());

            if let Some(version) = version {
                next = next.max(version + 1);
            }
        }
    }

    Ok(root.join(format!("version_{next}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_lines() {
        let dir = std::env::temp_dir().join(format!("topic-files-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("labels.txt");
        std::fs::write(&path, "World\nSports\n").unwrap();

        let lines = read_file(&path).await.unwrap();

        assert_eq!(lines, vec!["World".to_string(), "Sports".to_string()]);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn picks_the_next_version() {
        let root = std::env::temp_dir().join(format!("topic-versions-{}", std::process::id()));
        std::fs::create_dir_all(root.join("version_0")).unwrap();
        std::fs::create_dir_all(root.join("version_3")).unwrap();
        std::fs::create_dir_all(root.join("other")).unwrap();

        assert_eq!(next_version_dir(&root).unwrap(), root.join("version_4"));
        std::fs::remove_dir_all(root).unwrap();
    }
}
