mod dataloader;
mod errors;
mod star_wars;
