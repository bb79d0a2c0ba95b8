//! Folder content encryption.
//!
//! A `FolderCipher` encrypts or decrypts every file of a folder in place.
//! The engine treats each call as all-or-nothing.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use phantomvault_common::{Error, Password, Result};
use phantomvault_crypto::encoding::base64_bytes;
use phantomvault_crypto::{decrypt, decrypt_bytes, derive_key, encrypt, encrypt_bytes, KdfParams, Salt};

/// Header file written at the root of an encrypted folder.
pub const HEADER_FILENAME: &str = ".phantomvault";

/// Cipher-owned working directory at the folder root.
pub const STAGING_DIRNAME: &str = ".phantomvault-staging";

/// Superseded files of a finished commit, removed right after.
const DISCARD_DIRNAME: &str = ".phantomvault-discard";

const STAGED_SUBDIR: &str = "new";
const ORIGINALS_SUBDIR: &str = "old";

const HEADER_VERSION: u32 = 1;
const VERIFICATION_PLAINTEXT: &[u8] = b"PHANTOMVAULT_FOLDER_KEY_V1";

/// Encrypts and decrypts folder contents in place.
#[async_trait]
pub trait FolderCipher: Send + Sync {
    /// Encrypt every file under `path`.
    ///
    /// # Errors
    /// - Validation error if the folder is already encrypted
    /// - Crypto or I/O errors; the folder is left as it was
    async fn encrypt_folder(&self, path: &Path, password: &Password) -> Result<()>;

    /// Decrypt every file under `path`.
    ///
    /// # Errors
    /// - Authentication error if the password does not match; no file is touched
    /// - Crypto or I/O errors; the folder is left as it was
    async fn decrypt_folder(&self, path: &Path, password: &Password) -> Result<()>;
}

#[derive(Serialize, Deserialize)]
struct FolderHeader {
    version: u32,
    salt: Salt,
    iterations: u32,
    #[serde(with = "base64_bytes")]
    verification: Vec<u8>,
}

/// Default cipher: chunked XChaCha20-Poly1305 per file.
///
/// Works in two phases. Every output is first written under
/// `.phantomvault-staging/`; the commit then swaps files by rename and
/// keeps the originals until every swap has succeeded, so a failure at any
/// point puts the folder back as it was.
#[derive(Debug, Clone)]
pub struct AeadFolderCipher {
    params: KdfParams,
}

impl AeadFolderCipher {
    pub fn new(params: KdfParams) -> Self {
        Self { params }
    }

    /// True if `path` carries an encryption header.
    pub fn is_encrypted(path: &Path) -> bool {
        path.join(HEADER_FILENAME).is_file()
    }
}

type Rename = dyn Fn(&Path, &Path) -> io::Result<()>;

fn fs_rename(from: &Path, to: &Path) -> io::Result<()> {
    std::fs::rename(from, to)
}

/// Relative paths of the regular files under `root`.
///
/// Only the header and the cipher's own directories are left out.
fn content_files(root: &Path) -> Result<Vec<PathBuf>> {
    let reserved = [HEADER_FILENAME, STAGING_DIRNAME, DISCARD_DIRNAME];
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() != 1 || !reserved.iter().any(|name| e.file_name() == *name));

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| Error::Resource(format!("walk {}: {}", root.display(), e)))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| Error::Resource(format!("walk {}: {}", root.display(), e)))?;
        files.push(relative.to_path_buf());
    }
    Ok(files)
}

/// What happens to the header in the commit.
enum HeaderChange {
    Install(Vec<u8>),
    Retire,
}

/// The staging directory of one operation.
struct Staging {
    folder: PathBuf,
    dir: PathBuf,
}

impl Staging {
    /// Refuses to reuse a staging directory left by an interrupted commit.
    fn create(folder: &Path) -> Result<Self> {
        let dir = folder.join(STAGING_DIRNAME);
        if dir.exists() {
            return Err(Error::Validation(format!(
                "Folder has an unfinished operation; restore the originals kept in {} manually",
                dir.display()
            )));
        }
        let discard = folder.join(DISCARD_DIRNAME);
        if discard.exists() {
            std::fs::remove_dir_all(&discard)?;
        }
        std::fs::create_dir_all(dir.join(STAGED_SUBDIR))?;
        std::fs::create_dir_all(dir.join(ORIGINALS_SUBDIR))?;
        Ok(Self {
            folder: folder.to_path_buf(),
            dir,
        })
    }

    fn staged(&self, relative: &Path) -> PathBuf {
        self.dir.join(STAGED_SUBDIR).join(relative)
    }

    fn original(&self, relative: &Path) -> PathBuf {
        self.dir.join(ORIGINALS_SUBDIR).join(relative)
    }

    fn write_staged(&self, relative: &Path, data: &[u8]) -> Result<()> {
        let staged = self.staged(relative);
        for dir in [staged.parent(), self.original(relative).parent()].into_iter().flatten() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(staged, data)?;
        Ok(())
    }

    /// Drop the staging directory once nothing in it is needed.
    fn abandon(&self) {
        if let Err(e) = std::fs::remove_dir_all(&self.dir) {
            warn!(path = %self.dir.display(), error = %e, "Could not remove staging directory");
        }
    }

    /// Renames that swap staged outputs in and move the originals aside.
    fn plan(&self, files: &[PathBuf], header: &HeaderChange) -> Vec<(PathBuf, PathBuf)> {
        let mut plan = Vec::with_capacity(files.len() * 2 + 1);
        for relative in files {
            let target = self.folder.join(relative);
            plan.push((target.clone(), self.original(relative)));
            plan.push((self.staged(relative), target));
        }
        let header_path = self.folder.join(HEADER_FILENAME);
        let header_file = Path::new(HEADER_FILENAME);
        match header {
            HeaderChange::Install(_) => plan.push((self.staged(header_file), header_path)),
            HeaderChange::Retire => plan.push((header_path, self.original(header_file))),
        }
        plan
    }
}

/// Undo applied renames, newest first.
fn undo(applied: &[(PathBuf, PathBuf)], rename: &Rename) -> io::Result<()> {
    for (from, to) in applied.iter().rev() {
        rename(to, from)?;
    }
    Ok(())
}

fn stuck(cause: &io::Error, undo_error: &io::Error, staging: &Staging) -> Error {
    error!(
        path = %staging.folder.display(),
        error = %cause,
        undo_error = %undo_error,
        "Folder commit could not be undone"
    );
    Error::Resource(format!(
        "Commit failed ({}) and could not be undone ({}); originals are kept in {}",
        cause,
        undo_error,
        staging.dir.display()
    ))
}

/// Transform every file into staging, then swap the results in.
fn transform_folder<F>(root: &Path, header: HeaderChange, transform: F, rename: &Rename) -> Result<usize>
where
    F: Fn(&[u8]) -> Result<Vec<u8>>,
{
    let files = content_files(root)?;
    let staging = Staging::create(root)?;

    let staged = files
        .iter()
        .try_for_each(|relative| {
            let data = std::fs::read(root.join(relative))?;
            staging.write_staged(relative, &transform(&data)?)
        })
        .and_then(|()| match &header {
            HeaderChange::Install(bytes) => staging.write_staged(Path::new(HEADER_FILENAME), bytes),
            HeaderChange::Retire => Ok(()),
        });
    if let Err(e) = staged {
        staging.abandon();
        return Err(e);
    }

    let plan = staging.plan(&files, &header);
    for (done, (from, to)) in plan.iter().enumerate() {
        if let Err(e) = rename(from, to) {
            return match undo(&plan[..done], rename) {
                Ok(()) => {
                    staging.abandon();
                    Err(e.into())
                }
                Err(u) => Err(stuck(&e, &u, &staging)),
            };
        }
    }

    // A single rename retires every superseded file at once.
    let discard = root.join(DISCARD_DIRNAME);
    if let Err(e) = rename(&staging.dir, &discard) {
        return match undo(&plan, rename) {
            Ok(()) => {
                staging.abandon();
                Err(e.into())
            }
            Err(u) => Err(stuck(&e, &u, &staging)),
        };
    }
    if let Err(e) = std::fs::remove_dir_all(&discard) {
        warn!(path = %discard.display(), error = %e, "Could not remove superseded files");
    }
    Ok(files.len())
}

fn read_header(root: &Path) -> Result<FolderHeader> {
    let path = root.join(HEADER_FILENAME);
    if !path.is_file() {
        return Err(Error::Validation(format!(
            "Folder is not encrypted: {}",
            root.display()
        )));
    }
    let header: FolderHeader = serde_json::from_slice(&std::fs::read(&path)?)
        .map_err(|e| Error::Crypto(format!("Invalid folder header: {}", e)))?;
    if header.version != HEADER_VERSION {
        return Err(Error::Crypto(format!(
            "Unsupported folder header version: {}",
            header.version
        )));
    }
    Ok(header)
}

fn encrypt_blocking(root: &Path, password: &Password, params: &KdfParams, rename: &Rename) -> Result<usize> {
    if !root.is_dir() {
        return Err(Error::Validation(format!("Not a directory: {}", root.display())));
    }
    if AeadFolderCipher::is_encrypted(root) {
        return Err(Error::Validation(format!(
            "Folder is already encrypted: {}",
            root.display()
        )));
    }

    let salt = Salt::generate();
    let key = derive_key(password.as_bytes(), &salt, params)?;
    let content_key = key.derive_subkey(b"content");
    let header = FolderHeader {
        version: HEADER_VERSION,
        salt,
        iterations: params.iterations,
        verification: encrypt(key.derive_subkey(b"verify").as_bytes(), VERIFICATION_PLAINTEXT)?,
    };
    let header_bytes = serde_json::to_vec_pretty(&header)?;

    transform_folder(
        root,
        HeaderChange::Install(header_bytes),
        |data| encrypt_bytes(content_key.as_bytes(), data),
        rename,
    )
}

fn decrypt_blocking(root: &Path, password: &Password, rename: &Rename) -> Result<usize> {
    let header = read_header(root)?;
    let key = derive_key(
        password.as_bytes(),
        &header.salt,
        &KdfParams::new(header.iterations),
    )?;
    decrypt(key.derive_subkey(b"verify").as_bytes(), &header.verification)
        .map_err(|_| Error::Authentication("Wrong password for folder".to_string()))?;
    let content_key = key.derive_subkey(b"content");

    transform_folder(
        root,
        HeaderChange::Retire,
        |data| decrypt_bytes(content_key.as_bytes(), data),
        rename,
    )
}

#[async_trait]
impl FolderCipher for AeadFolderCipher {
    async fn encrypt_folder(&self, path: &Path, password: &Password) -> Result<()> {
        let (root, password, params) = (path.to_path_buf(), password.clone(), self.params);
        let files = tokio::task::spawn_blocking(move || encrypt_blocking(&root, &password, &params, &fs_rename))
            .await
            .map_err(|e| Error::Crypto(format!("Encryption task failed: {}", e)))??;
        info!(path = %path.display(), files, "Folder encrypted");
        Ok(())
    }

    async fn decrypt_folder(&self, path: &Path, password: &Password) -> Result<()> {
        let (root, password) = (path.to_path_buf(), password.clone());
        let files = tokio::task::spawn_blocking(move || decrypt_blocking(&root, &password, &fs_rename))
            .await
            .map_err(|e| Error::Crypto(format!("Decryption task failed: {}", e)))??;
        debug!(path = %path.display(), files, "Folder decrypted");
        Ok(())
    }
}
