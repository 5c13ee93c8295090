use rpcstress::error::AppResult;

fn main() -> AppResult<()> {
    rpcstress::entry::run()
}
