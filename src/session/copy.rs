use super::*;

use super::channel::transfer_exit;
use crate::transfer::{
    TransferDescriptor, TransferReport, receive_file, send_file, shell_quote, split_remote_path,
};

impl RemoteHost {
    /// Uploads exactly `size` bytes from `reader` to `remote_path` with
    /// permission bits `mode`, using `scp -qt` on the remote side.
    ///
    /// The remote directory must exist. A reader that ends before `size`
    /// bytes is a [`RemoteError::Transfer`].
    pub async fn upload_from_reader<R>(
        &self,
        reader: R,
        remote_path: &str,
        size: u64,
        mode: u32,
    ) -> Result<TransferReport, RemoteError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let (dir, name) = split_remote_path(remote_path)?;
        let descriptor = TransferDescriptor::new(mode, size, name);
        let command = format!("{} -qt {}", self.options.scp_path, shell_quote(&dir));
        debug!("{} uploading {descriptor} to {dir}", self.label());

        let mut session = self.new_session().await?;
        session.exec(&command).await?;

        let cancel = self.ctx.cancellation_token().child_token();
        let mut remote_in = session.writer();
        let mut remote_out = tokio::io::sink();
        let mut remote_err = Vec::new();

        let sending = async {
            let sent = send_file(reader, &mut remote_in, &descriptor).await;
            if sent.is_err() {
                cancel.cancel();
            }
            sent
        };
        let pumping = session.pump(&mut remote_out, Some(&mut remote_err), &cancel);
        let (sent, pumped) = tokio::join!(sending, pumping);

        let report = sent?;
        let exit = pumped?;
        transfer_exit(&self.label(), &command, &exit, &remote_err)?;
        Ok(report)
    }

    /// Uploads the local file at `local_path` with mode 0660.
    pub async fn upload(
        &self,
        local_path: impl AsRef<Path>,
        remote_path: &str,
    ) -> Result<TransferReport, RemoteError> {
        let file = tokio::fs::File::open(local_path.as_ref()).await?;
        let size = file.metadata().await?.len();
        self.upload_from_reader(file, remote_path, size, config::UPLOAD_FILE_MODE)
            .await
    }

    /// Writes `content` to `remote_path` with mode 0600.
    pub async fn put(
        &self,
        content: impl AsRef<[u8]>,
        remote_path: &str,
    ) -> Result<TransferReport, RemoteError> {
        let content = content.as_ref();
        self.upload_from_reader(
            content,
            remote_path,
            content.len() as u64,
            config::PUT_CONTENT_MODE,
        )
        .await
    }

    /// Downloads `remote_path` into `writer`, using `scp -f` on the remote
    /// side. Exactly the announced number of bytes is written.
    pub async fn download_to_writer<W>(
        &self,
        remote_path: &str,
        writer: &mut W,
    ) -> Result<TransferReport, RemoteError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let command = format!("{} -f {}", self.options.scp_path, shell_quote(remote_path));
        debug!("{} downloading {remote_path}", self.label());

        let mut session = self.new_session().await?;
        session.exec(&command).await?;

        let cancel = self.ctx.cancellation_token().child_token();
        let remote_in = session.writer();
        let (remote_out, remote_out_rx) = tokio::io::duplex(config::PIPE_CAPACITY);
        let mut remote_err = Vec::new();

        let receiving = async {
            let mut remote_in = remote_in;
            let received = receive_file(remote_out_rx, &mut remote_in, writer).await;
            if received.is_err() {
                cancel.cancel();
            } else if let Err(e) = remote_in.shutdown().await {
                trace!("{} closing scp stdin: {e}", self.label());
            }
            received
        };
        let pumping = async {
            let mut remote_out = remote_out;
            session
                .pump(&mut remote_out, Some(&mut remote_err), &cancel)
                .await
        };
        let (received, pumped) = tokio::join!(receiving, pumping);

        let report = received?;
        let exit = pumped?;
        transfer_exit(&self.label(), &command, &exit, &remote_err)?;
        Ok(report)
    }

    /// Downloads `remote_path` to the local file `local_path`. A partial
    /// file is removed when the transfer fails.
    pub async fn download(
        &self,
        remote_path: &str,
        local_path: impl AsRef<Path>,
    ) -> Result<TransferReport, RemoteError> {
        let local_path = local_path.as_ref();
        let mut file = tokio::fs::File::create(local_path).await?;
        let downloaded = self.download_to_writer(remote_path, &mut file).await;
        if downloaded.is_err() {
            drop(file);
            if let Err(e) = tokio::fs::remove_file(local_path).await {
                warn!("cannot remove partial download {}: {e}", local_path.display());
            }
        }
        downloaded
    }

    /// Returns the contents of `remote_path`, which must be valid UTF-8.
    pub async fn get(&self, remote_path: &str) -> Result<String, RemoteError> {
        let bytes = self.get_bytes(remote_path).await?;
        String::from_utf8(bytes)
            .map_err(|e| RemoteError::Transfer(format!("{remote_path} is not valid UTF-8: {e}")))
    }

    /// Returns the raw contents of `remote_path`.
    pub async fn get_bytes(&self, remote_path: &str) -> Result<Vec<u8>, RemoteError> {
        let mut content = Vec::new();
        self.download_to_writer(remote_path, &mut content).await?;
        Ok(content)
    }
}
